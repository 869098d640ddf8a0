//! Low-level hotkey mechanism: matching against the raw key stream.
//!
//! [`HotkeyMatcher`] is pure state-machine logic (modifier tracking,
//! trigger modes, re-fire throttling) so the interesting behaviour is
//! testable without any OS hook.  [`LowLevelHotkeyService`] wires a
//! matcher to a [`KeyEventBackend`]; the production backend grabs the
//! keyboard through rdev and swallows matched keystrokes by not
//! forwarding them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info};
use uuid::Uuid;

use macrokit_core::{KeyName, Modifiers, TriggerMode};

use crate::notify::{EngineEvent, EventBus};
use crate::sync::SyntheticInputFlag;

use super::{HotkeyBinding, HotkeyReadiness, HotkeySource, RegistrationError};

/// Minimum interval between fires of a held `RepeatWhileHeld` hotkey.
pub const REPEAT_REFIRE_INTERVAL: Duration = Duration::from_millis(150);

/// One raw keyboard sample as seen by the grab hook.
#[derive(Debug, Clone)]
pub struct RawKeyEvent {
    pub key: KeyName,
    pub is_down: bool,
    /// True when the engine itself injected this event.
    pub injected: bool,
    pub at: Instant,
}

/// What the matcher decided about one key event.
#[derive(Debug, Default, PartialEq)]
pub struct MatchOutcome {
    pub fired: Vec<HotkeyBinding>,
    /// Suppress the keystroke from reaching other applications.
    pub swallow: bool,
}

/// Pure hotkey matching over a raw key stream.
#[derive(Debug, Default)]
pub struct HotkeyMatcher {
    bindings: Vec<HotkeyBinding>,
    modifiers: Modifiers,
    keys_down: HashSet<KeyName>,
    last_fired: HashMap<Uuid, Instant>,
}

impl HotkeyMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding.  A definition that duplicates an existing one is
    /// an idempotent no-op.
    pub fn register(&mut self, binding: HotkeyBinding) {
        let duplicate = self
            .bindings
            .iter()
            .any(|b| b.definition.conflicts_with(&binding.definition));
        if duplicate {
            info!(label = %binding.definition.label, "duplicate hotkey registration ignored");
            return;
        }
        self.bindings.push(binding);
    }

    pub fn unregister(&mut self, id: Uuid) -> Result<(), RegistrationError> {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.id != id);
        if self.bindings.len() == before {
            return Err(RegistrationError::UnknownBinding(id));
        }
        self.last_fired.remove(&id);
        Ok(())
    }

    /// Feeds one key event through the matcher.
    ///
    /// Injected events are ignored entirely: they neither fire hotkeys
    /// nor disturb the tracked modifier state, so a replay cannot
    /// retrigger the hotkey that launched it.
    pub fn on_key_event(&mut self, event: &RawKeyEvent) -> MatchOutcome {
        if event.injected {
            return MatchOutcome::default();
        }

        if let Some(bit) = Modifiers::bit_for_key(&event.key) {
            if event.is_down {
                self.modifiers.set(bit);
            } else {
                self.modifiers.clear(bit);
            }
        }

        if !event.is_down {
            self.keys_down.remove(&event.key);
            return MatchOutcome::default();
        }

        // OS auto-repeat arrives as repeated downs without a release.
        let already_down = !self.keys_down.insert(event.key.clone());

        let mut outcome = MatchOutcome::default();
        for binding in &self.bindings {
            let def = &binding.definition;
            if def.key != event.key || !self.modifiers.contains(def.modifiers.0) {
                continue;
            }
            // Matched keystrokes are swallowed even when throttled, so a
            // held hotkey never leaks auto-repeats to other applications.
            outcome.swallow |= def.swallow;

            let fires = match def.trigger {
                TriggerMode::FireOnce => !already_down,
                TriggerMode::RepeatWhileHeld => match self.last_fired.get(&binding.id) {
                    Some(last) => event.at.duration_since(*last) >= REPEAT_REFIRE_INTERVAL,
                    None => true,
                },
            };
            if fires {
                self.last_fired.insert(binding.id, event.at);
                outcome.fired.push(binding.clone());
            }
        }
        outcome
    }
}

// ── Service wiring ──────────────────────────────────────────────────────

/// Callback given to a backend; returns whether to swallow the keystroke.
pub type KeyEventHandler = Arc<dyn Fn(RawKeyEvent) -> bool + Send + Sync>;

/// The hook a [`LowLevelHotkeyService`] listens through.
pub trait KeyEventBackend: Send {
    /// Starts delivering key events to the handler.  Returns once the
    /// hook is installed; delivery continues on a backend-owned thread.
    fn run(self: Box<Self>, on_event: KeyEventHandler) -> Result<(), RegistrationError>;
}

/// Low-level hotkey mechanism: a shared matcher behind a key hook.
pub struct LowLevelHotkeyService {
    matcher: Arc<Mutex<HotkeyMatcher>>,
    events: EventBus,
    running: Arc<AtomicBool>,
}

impl LowLevelHotkeyService {
    pub fn new(events: EventBus) -> Self {
        Self {
            matcher: Arc::new(Mutex::new(HotkeyMatcher::new())),
            events,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Installs the hook and starts matching.
    pub fn start(&self, backend: Box<dyn KeyEventBackend>) -> Result<(), RegistrationError> {
        let matcher = Arc::clone(&self.matcher);
        let events = self.events.clone();
        let handler: KeyEventHandler = Arc::new(move |event: RawKeyEvent| {
            let outcome = {
                let mut matcher = matcher.lock().unwrap_or_else(|p| p.into_inner());
                matcher.on_key_event(&event)
            };
            for binding in outcome.fired {
                events.publish(EngineEvent::HotkeyPressed {
                    binding_id: binding.id,
                    script_id: binding.script_id,
                    label: binding.definition.label,
                });
            }
            outcome.swallow
        });
        backend.run(handler)?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl HotkeySource for LowLevelHotkeyService {
    async fn register(&self, binding: HotkeyBinding) -> Result<(), RegistrationError> {
        let mut matcher = self.matcher.lock().unwrap_or_else(|p| p.into_inner());
        matcher.register(binding);
        Ok(())
    }

    async fn unregister(&self, id: Uuid) -> Result<(), RegistrationError> {
        let mut matcher = self.matcher.lock().unwrap_or_else(|p| p.into_inner());
        matcher.unregister(id)
    }
}

impl HotkeyReadiness for LowLevelHotkeyService {
    fn is_ready(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Production backend: grabs the keyboard through rdev.
///
/// Returning `None` from the grab callback swallows the event before any
/// other application sees it.
pub struct RdevGrabBackend {
    synthetic: SyntheticInputFlag,
}

impl RdevGrabBackend {
    pub fn new(synthetic: SyntheticInputFlag) -> Self {
        Self { synthetic }
    }
}

impl KeyEventBackend for RdevGrabBackend {
    fn run(self: Box<Self>, on_event: KeyEventHandler) -> Result<(), RegistrationError> {
        let synthetic = self.synthetic;
        std::thread::spawn(move || {
            let result = rdev::grab(move |event| {
                let (key, is_down) = match event.event_type {
                    rdev::EventType::KeyPress(key) => (key, true),
                    rdev::EventType::KeyRelease(key) => (key, false),
                    _ => return Some(event),
                };
                let raw = RawKeyEvent {
                    key: crate::infrastructure::rdev_map::key_name_from_rdev(key),
                    is_down,
                    injected: synthetic.is_active(),
                    at: Instant::now(),
                };
                if on_event(raw) {
                    None
                } else {
                    Some(event)
                }
            });
            if let Err(e) = result {
                error!(?e, "keyboard grab hook failed");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrokit_core::HotkeyDefinition;

    fn down(key: &str, at: Instant) -> RawKeyEvent {
        RawKeyEvent {
            key: KeyName::parse(key),
            is_down: true,
            injected: false,
            at,
        }
    }

    fn up(key: &str, at: Instant) -> RawKeyEvent {
        RawKeyEvent {
            key: KeyName::parse(key),
            is_down: false,
            injected: false,
            at,
        }
    }

    fn binding(modifiers: u8, key: &str, trigger: TriggerMode, swallow: bool) -> HotkeyBinding {
        let mut def = HotkeyDefinition::new(Modifiers(modifiers), KeyName::parse(key), trigger);
        def.swallow = swallow;
        HotkeyBinding::new(def, Some(Uuid::new_v4()))
    }

    #[test]
    fn test_fire_once_fires_on_press_and_rearms_on_release() {
        let mut matcher = HotkeyMatcher::new();
        matcher.register(binding(0, "f5", TriggerMode::FireOnce, false));
        let t0 = Instant::now();

        assert_eq!(matcher.on_key_event(&down("f5", t0)).fired.len(), 1);
        // Auto-repeat: held key fires no more.
        assert!(matcher.on_key_event(&down("f5", t0)).fired.is_empty());
        assert!(matcher.on_key_event(&down("f5", t0)).fired.is_empty());
        // Release re-arms.
        matcher.on_key_event(&up("f5", t0));
        assert_eq!(matcher.on_key_event(&down("f5", t0)).fired.len(), 1);
    }

    #[test]
    fn test_repeat_while_held_throttles_refires() {
        let mut matcher = HotkeyMatcher::new();
        matcher.register(binding(0, "f5", TriggerMode::RepeatWhileHeld, false));
        let t0 = Instant::now();

        assert_eq!(matcher.on_key_event(&down("f5", t0)).fired.len(), 1);
        // Auto-repeats inside the throttle window do not fire.
        let t1 = t0 + Duration::from_millis(30);
        assert!(matcher.on_key_event(&down("f5", t1)).fired.is_empty());
        // Past the interval the hotkey fires again without a release.
        let t2 = t0 + REPEAT_REFIRE_INTERVAL;
        assert_eq!(matcher.on_key_event(&down("f5", t2)).fired.len(), 1);
    }

    #[test]
    fn test_modifiers_must_be_held() {
        let mut matcher = HotkeyMatcher::new();
        matcher.register(binding(
            Modifiers::CTRL | Modifiers::SHIFT,
            "k",
            TriggerMode::FireOnce,
            false,
        ));
        let t0 = Instant::now();

        assert!(matcher.on_key_event(&down("k", t0)).fired.is_empty());

        matcher.on_key_event(&down("ctrl", t0));
        assert!(matcher.on_key_event(&down("k", t0)).fired.is_empty());
        matcher.on_key_event(&up("k", t0));

        matcher.on_key_event(&down("shift", t0));
        assert_eq!(matcher.on_key_event(&down("k", t0)).fired.len(), 1);

        // Releasing a required modifier stops matching again.
        matcher.on_key_event(&up("k", t0));
        matcher.on_key_event(&up("ctrl", t0));
        assert!(matcher.on_key_event(&down("k", t0)).fired.is_empty());
    }

    #[test]
    fn test_right_hand_modifiers_count() {
        let mut matcher = HotkeyMatcher::new();
        matcher.register(binding(Modifiers::CTRL, "k", TriggerMode::FireOnce, false));
        let t0 = Instant::now();

        matcher.on_key_event(&down("right_ctrl", t0));
        assert_eq!(matcher.on_key_event(&down("k", t0)).fired.len(), 1);
    }

    #[test]
    fn test_injected_events_are_ignored() {
        let mut matcher = HotkeyMatcher::new();
        matcher.register(binding(0, "f5", TriggerMode::FireOnce, true));

        let event = RawKeyEvent {
            key: KeyName::parse("f5"),
            is_down: true,
            injected: true,
            at: Instant::now(),
        };
        let outcome = matcher.on_key_event(&event);
        assert!(outcome.fired.is_empty());
        assert!(!outcome.swallow);
    }

    #[test]
    fn test_swallow_applies_even_when_throttled() {
        let mut matcher = HotkeyMatcher::new();
        matcher.register(binding(0, "f5", TriggerMode::FireOnce, true));
        let t0 = Instant::now();

        assert!(matcher.on_key_event(&down("f5", t0)).swallow);
        // Auto-repeat: no fire, but still swallowed.
        let repeat = matcher.on_key_event(&down("f5", t0));
        assert!(repeat.fired.is_empty());
        assert!(repeat.swallow);
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let mut matcher = HotkeyMatcher::new();
        let first = binding(0, "f5", TriggerMode::FireOnce, false);
        let second = binding(0, "f5", TriggerMode::FireOnce, false);
        matcher.register(first);
        matcher.register(second);

        let outcome = matcher.on_key_event(&down("f5", Instant::now()));
        assert_eq!(outcome.fired.len(), 1);
    }

    #[test]
    fn test_fired_bindings_are_identified_by_id_even_with_equal_labels() {
        let mut matcher = HotkeyMatcher::new();
        let mut start_def =
            HotkeyDefinition::new(Modifiers::NONE, KeyName::parse("f9"), TriggerMode::FireOnce);
        start_def.label = "recording".to_string();
        let mut cancel_def =
            HotkeyDefinition::new(Modifiers::NONE, KeyName::parse("f11"), TriggerMode::FireOnce);
        cancel_def.label = "recording".to_string();
        let start = HotkeyBinding::new(start_def, None);
        let cancel = HotkeyBinding::new(cancel_def, None);
        let (start_id, cancel_id) = (start.id, cancel.id);
        matcher.register(start);
        matcher.register(cancel);

        let t0 = Instant::now();
        let fired = matcher.on_key_event(&down("f9", t0)).fired;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, start_id);

        let fired = matcher.on_key_event(&down("f11", t0)).fired;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, cancel_id);
        assert_ne!(start_id, cancel_id);
    }

    #[test]
    fn test_unregister_unknown_binding_errors() {
        let mut matcher = HotkeyMatcher::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            matcher.unregister(id),
            Err(RegistrationError::UnknownBinding(got)) if got == id
        ));
    }

    #[tokio::test]
    async fn test_service_publishes_hotkey_pressed() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let service = LowLevelHotkeyService::new(bus);

        let script_id = Uuid::new_v4();
        let def = HotkeyDefinition::new(
            Modifiers::NONE,
            KeyName::parse("f5"),
            TriggerMode::FireOnce,
        );
        service
            .register(HotkeyBinding::new(def, Some(script_id)))
            .await
            .unwrap();

        // Drive the matcher directly, as the backend handler would.
        {
            let mut matcher = service.matcher.lock().unwrap();
            let outcome = matcher.on_key_event(&down("f5", Instant::now()));
            for binding in outcome.fired {
                service.events.publish(EngineEvent::HotkeyPressed {
                    binding_id: binding.id,
                    script_id: binding.script_id,
                    label: binding.definition.label,
                });
            }
        }

        match rx.recv().await.unwrap() {
            EngineEvent::HotkeyPressed { script_id: got, .. } => {
                assert_eq!(got, Some(script_id));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
