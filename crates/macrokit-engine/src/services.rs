//! Collaborator seams the coordinators depend on.
//!
//! These traits are deliberately narrow: the coordinators only see the
//! operations they actually use, and tests substitute in-memory doubles.
//! The default implementations at the bottom are real enough for the
//! headless binary and for integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use macrokit_core::{HotkeyDefinition, KeyName, Modifiers, Script, TriggerMode};

// ── Script catalog ──────────────────────────────────────────────────────

/// Read/write access to the script store owned by the surrounding
/// application.
pub trait ScriptCatalog: Send + Sync {
    fn get(&self, id: Uuid) -> Option<Script>;
    fn put(&self, script: Script);
}

/// Mutex-over-HashMap catalog for the binary and for tests.
#[derive(Debug, Default)]
pub struct InMemoryScriptCatalog {
    scripts: Mutex<HashMap<Uuid, Script>>,
}

impl InMemoryScriptCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptCatalog for InMemoryScriptCatalog {
    fn get(&self, id: Uuid) -> Option<Script> {
        let scripts = self.scripts.lock().unwrap_or_else(|p| p.into_inner());
        scripts.get(&id).cloned()
    }

    fn put(&self, script: Script) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|p| p.into_inner());
        scripts.insert(script.id, script);
    }
}

// ── Relay connectivity ──────────────────────────────────────────────────

/// Transport-level failures talking to the relay device.
#[derive(Debug, Error)]
pub enum RelayIoError {
    #[error("relay device is not connected")]
    NotConnected,
    #[error("relay transfer failed: {0}")]
    Transfer(String),
}

/// Frame-level transport to the hardware relay device.
///
/// Framing is the transport's job: one call, one frame.  `recv_frame`
/// returns `Ok(None)` when no frame arrived within the timeout.
pub trait RelayConnectivity: Send + Sync {
    fn is_connected(&self) -> bool;
    fn send_frame(&self, frame: &[u8]) -> Result<(), RelayIoError>;
    fn recv_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>, RelayIoError>;
}

/// In-process relay double: records every sent frame and serves queued
/// inbound frames.  Used by tests and by the headless binary when no
/// hardware is attached.
#[derive(Debug, Default)]
pub struct LoopbackRelay {
    connected: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    inbound: Mutex<VecDeque<Vec<u8>>>,
}

impl LoopbackRelay {
    pub fn connected() -> Self {
        let relay = Self::default();
        relay.connected.store(true, Ordering::SeqCst);
        relay
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Queues a frame to be returned by the next `recv_frame` calls.
    pub fn push_inbound(&self, frame: Vec<u8>) {
        let mut inbound = self.inbound.lock().unwrap_or_else(|p| p.into_inner());
        inbound.push_back(frame);
    }

    /// Every frame sent so far, oldest first.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        let sent = self.sent.lock().unwrap_or_else(|p| p.into_inner());
        sent.clone()
    }
}

impl RelayConnectivity for LoopbackRelay {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_frame(&self, frame: &[u8]) -> Result<(), RelayIoError> {
        if !self.is_connected() {
            return Err(RelayIoError::NotConnected);
        }
        let mut sent = self.sent.lock().unwrap_or_else(|p| p.into_inner());
        sent.push(frame.to_vec());
        Ok(())
    }

    fn recv_frame(&self, _timeout: Duration) -> Result<Option<Vec<u8>>, RelayIoError> {
        if !self.is_connected() {
            return Err(RelayIoError::NotConnected);
        }
        let mut inbound = self.inbound.lock().unwrap_or_else(|p| p.into_inner());
        Ok(inbound.pop_front())
    }
}

// ── Kill switch ─────────────────────────────────────────────────────────

/// Global safety gate checked before and during every replay.
pub trait SafetyGate: Send + Sync {
    fn is_kill_switch_active(&self) -> bool;
}

/// Flag-backed gate; the hotkey subsystem trips it, an operator action
/// resets it.
#[derive(Debug, Default)]
pub struct StaticSafetyGate {
    active: AtomicBool,
}

impl StaticSafetyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl SafetyGate for StaticSafetyGate {
    fn is_kill_switch_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

// ── Recording control hotkeys ───────────────────────────────────────────

/// The three hotkeys reserved for controlling a recording in progress.
///
/// Key presses matching any of these (by key alone, modifiers ignored)
/// are suppressed from the recorded stream so a recording never captures
/// its own controls.
#[derive(Debug, Clone)]
pub struct RecordingControlKeys {
    pub start_stop: HotkeyDefinition,
    pub pause_resume: HotkeyDefinition,
    pub cancel: HotkeyDefinition,
}

impl RecordingControlKeys {
    pub fn keys(&self) -> [&KeyName; 3] {
        [
            &self.start_stop.key,
            &self.pause_resume.key,
            &self.cancel.key,
        ]
    }
}

impl Default for RecordingControlKeys {
    fn default() -> Self {
        let reserved = |name: &str| {
            let mut def = HotkeyDefinition::new(
                Modifiers::NONE,
                KeyName::parse(name),
                TriggerMode::FireOnce,
            );
            def.swallow = true;
            def
        };
        Self {
            start_stop: reserved("f9"),
            pause_resume: reserved("f10"),
            cancel: reserved("f11"),
        }
    }
}

/// Settings source for the reserved recording-control hotkeys.
pub trait RecordingControlSettings: Send + Sync {
    fn control_hotkeys(&self) -> RecordingControlKeys;
}

/// Fixed settings carrying the defaults (F9 start/stop, F10 pause/resume,
/// F11 cancel).
#[derive(Debug, Clone, Default)]
pub struct StaticControlSettings {
    keys: RecordingControlKeys,
}

impl StaticControlSettings {
    pub fn new(keys: RecordingControlKeys) -> Self {
        Self { keys }
    }
}

impl RecordingControlSettings for StaticControlSettings {
    fn control_hotkeys(&self) -> RecordingControlKeys {
        self.keys.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_round_trip() {
        let catalog = InMemoryScriptCatalog::new();
        let script = Script::new("demo", "move(1,2)");
        let id = script.id;

        catalog.put(script);
        assert_eq!(catalog.get(id).unwrap().name, "demo");
        assert!(catalog.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_loopback_relay_requires_connection() {
        let relay = LoopbackRelay::disconnected();
        assert!(matches!(
            relay.send_frame(&[0x01]),
            Err(RelayIoError::NotConnected)
        ));

        let relay = LoopbackRelay::connected();
        relay.send_frame(&[0x01, 0x02]).unwrap();
        assert_eq!(relay.sent_frames(), vec![vec![0x01, 0x02]]);
    }

    #[test]
    fn test_loopback_relay_serves_queued_frames_in_order() {
        let relay = LoopbackRelay::connected();
        relay.push_inbound(vec![0x05, b'h', b'i']);
        relay.push_inbound(vec![0x06, 0, 0, 0, 0]);

        let first = relay.recv_frame(Duration::from_millis(1)).unwrap();
        assert_eq!(first, Some(vec![0x05, b'h', b'i']));
        let second = relay.recv_frame(Duration::from_millis(1)).unwrap();
        assert_eq!(second, Some(vec![0x06, 0, 0, 0, 0]));
        assert_eq!(relay.recv_frame(Duration::from_millis(1)).unwrap(), None);
    }

    #[test]
    fn test_safety_gate_trips_and_resets() {
        let gate = StaticSafetyGate::new();
        assert!(!gate.is_kill_switch_active());
        gate.trip();
        assert!(gate.is_kill_switch_active());
        gate.reset();
        assert!(!gate.is_kill_switch_active());
    }

    #[test]
    fn test_default_control_keys_are_the_reserved_function_keys() {
        let keys = RecordingControlKeys::default();
        let names: Vec<&str> = keys.keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["f9", "f10", "f11"]);
        assert!(keys.start_stop.swallow);
    }
}
