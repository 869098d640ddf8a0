//! Native hotkey mechanism: registration through the OS hotkey facility.
//!
//! The OS manager is not thread-safe and its events arrive on a global
//! receiver, so all interaction happens on one dedicated worker thread.
//! The async [`HotkeySource`] methods send requests over a channel and
//! await a reply with a timeout; a wedged worker surfaces as a typed
//! error instead of a hang.
//!
//! The native facility has no notion of trigger modes or selective
//! swallowing; bindings registered here fire once per press and the OS
//! decides what the keystroke does elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use async_trait::async_trait;
use global_hotkey::hotkey::{Code, HotKey, Modifiers as NativeModifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use uuid::Uuid;

use macrokit_core::Modifiers;

use crate::notify::{EngineEvent, EventBus};

use super::{HotkeyBinding, HotkeyReadiness, HotkeySource, RegistrationError};

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

enum Request {
    Register {
        binding: HotkeyBinding,
        reply: oneshot::Sender<Result<(), RegistrationError>>,
    },
    Unregister {
        id: Uuid,
        reply: oneshot::Sender<Result<(), RegistrationError>>,
    },
}

/// Native hotkey mechanism behind a dedicated worker thread.
pub struct NativeHotkeyRegistrar {
    tx: mpsc::Sender<Request>,
    alive: Arc<AtomicBool>,
}

impl NativeHotkeyRegistrar {
    pub fn new(events: EventBus) -> Self {
        let (tx, rx) = mpsc::channel();
        let alive = Arc::new(AtomicBool::new(false));
        let worker_alive = Arc::clone(&alive);
        std::thread::spawn(move || run_worker(rx, events, worker_alive));
        Self { tx, alive }
    }

    async fn request<F>(&self, build: F) -> Result<(), RegistrationError>
    where
        F: FnOnce(oneshot::Sender<Result<(), RegistrationError>>) -> Request,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| RegistrationError::WorkerGone)?;
        match tokio::time::timeout(REPLY_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RegistrationError::WorkerGone),
            Err(_) => Err(RegistrationError::Timeout(REPLY_TIMEOUT)),
        }
    }
}

#[async_trait]
impl HotkeySource for NativeHotkeyRegistrar {
    async fn register(&self, binding: HotkeyBinding) -> Result<(), RegistrationError> {
        self.request(|reply| Request::Register { binding, reply }).await
    }

    async fn unregister(&self, id: Uuid) -> Result<(), RegistrationError> {
        self.request(|reply| Request::Unregister { id, reply }).await
    }
}

impl HotkeyReadiness for NativeHotkeyRegistrar {
    fn is_ready(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

struct Registered {
    binding: HotkeyBinding,
    native: HotKey,
}

fn run_worker(rx: mpsc::Receiver<Request>, events: EventBus, alive: Arc<AtomicBool>) {
    let manager = match GlobalHotKeyManager::new() {
        Ok(manager) => manager,
        Err(e) => {
            error!(%e, "OS hotkey manager unavailable");
            // Fail every request instead of hanging callers.
            while let Ok(request) = rx.recv() {
                let reply = match request {
                    Request::Register { reply, .. } => reply,
                    Request::Unregister { reply, .. } => reply,
                };
                let _ = reply.send(Err(RegistrationError::Platform {
                    message: e.to_string(),
                }));
            }
            return;
        }
    };
    alive.store(true, Ordering::SeqCst);
    info!("native hotkey worker started");

    let mut registered: Vec<Registered> = Vec::new();
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Request::Register { binding, reply }) => {
                let _ = reply.send(do_register(&manager, &mut registered, binding));
            }
            Ok(Request::Unregister { id, reply }) => {
                let _ = reply.send(do_unregister(&manager, &mut registered, id));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if event.state != HotKeyState::Pressed {
                continue;
            }
            if let Some(entry) = registered.iter().find(|r| r.native.id() == event.id) {
                debug!(label = %entry.binding.definition.label, "native hotkey fired");
                events.publish(EngineEvent::HotkeyPressed {
                    binding_id: entry.binding.id,
                    script_id: entry.binding.script_id,
                    label: entry.binding.definition.label.clone(),
                });
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
}

fn do_register(
    manager: &GlobalHotKeyManager,
    registered: &mut Vec<Registered>,
    binding: HotkeyBinding,
) -> Result<(), RegistrationError> {
    let duplicate = registered
        .iter()
        .any(|r| r.binding.definition.conflicts_with(&binding.definition));
    if duplicate {
        info!(label = %binding.definition.label, "duplicate hotkey registration ignored");
        return Ok(());
    }

    let code = native_code(binding.definition.key.as_str())
        .ok_or_else(|| RegistrationError::UnsupportedKey(binding.definition.key.to_string()))?;
    let native = HotKey::new(Some(native_modifiers(binding.definition.modifiers)), code);
    manager.register(native).map_err(|e| RegistrationError::Platform {
        message: e.to_string(),
    })?;
    registered.push(Registered { binding, native });
    Ok(())
}

fn do_unregister(
    manager: &GlobalHotKeyManager,
    registered: &mut Vec<Registered>,
    id: Uuid,
) -> Result<(), RegistrationError> {
    let index = registered
        .iter()
        .position(|r| r.binding.id == id)
        .ok_or(RegistrationError::UnknownBinding(id))?;
    let entry = registered.remove(index);
    manager
        .unregister(entry.native)
        .map_err(|e| RegistrationError::Platform {
            message: e.to_string(),
        })
}

fn native_modifiers(modifiers: Modifiers) -> NativeModifiers {
    let mut native = NativeModifiers::empty();
    if modifiers.contains(Modifiers::CTRL) {
        native |= NativeModifiers::CONTROL;
    }
    if modifiers.contains(Modifiers::SHIFT) {
        native |= NativeModifiers::SHIFT;
    }
    if modifiers.contains(Modifiers::ALT) {
        native |= NativeModifiers::ALT;
    }
    if modifiers.contains(Modifiers::META) {
        native |= NativeModifiers::META;
    }
    native
}

fn native_code(name: &str) -> Option<Code> {
    let code = match name {
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        "0" => Code::Digit0,
        "enter" => Code::Enter,
        "escape" => Code::Escape,
        "backspace" => Code::Backspace,
        "tab" => Code::Tab,
        "space" => Code::Space,
        "minus" => Code::Minus,
        "equal" => Code::Equal,
        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,
        "insert" => Code::Insert,
        "home" => Code::Home,
        "page_up" => Code::PageUp,
        "delete" => Code::Delete,
        "end" => Code::End,
        "page_down" => Code::PageDown,
        "right" => Code::ArrowRight,
        "left" => Code::ArrowLeft,
        "down" => Code::ArrowDown,
        "up" => Code::ArrowUp,
        _ => return None,
    };
    Some(code)
}
