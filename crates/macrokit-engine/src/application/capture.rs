//! The capture coordinator: turns a raw input-event stream into recorded
//! commands.
//!
//! # How recording works (for beginners)
//!
//! `start` resolves an input-event source, installs it, and spawns a pump
//! thread that reads raw samples off the source channel.  Each sample is
//! filtered (event-class toggles, mouse-move thinning, auto-repeat
//! suppression, control-hotkey suppression) and, if it survives, becomes
//! a [`Command`] whose delay is the time since the previously recorded
//! command, clamped into the configured window.  The first command after
//! a start or resume always gets a zero delay so replays begin
//! immediately.
//!
//! Timing is computed from the timestamps events carry, never from when
//! the pump thread got scheduled, so the recorded timeline is a pure
//! function of the input stream.
//!
//! A failing handler publishes [`EngineEvent::RecordingError`] and the
//! pump keeps going; only `stop`/`cancel` or a failed setup end a
//! session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use macrokit_core::{Command, CommandKind, KeyName};

use crate::infrastructure::hotkey::HotkeyReadiness;
use crate::infrastructure::source::{
    InputEventSource, SourceError, SourceEvent, SourceEventKind, SourceKind, SourceResolver,
};
use crate::notify::{EngineEvent, EventBus};
use crate::services::RecordingControlSettings;

/// How mouse motion is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseMode {
    /// Absolute screen coordinates.
    #[default]
    Absolute,
    /// Deltas from the position at recording start.
    Relative,
}

/// Per-session recording options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub record_mouse_movements: bool,
    pub record_mouse_clicks: bool,
    pub record_keyboard: bool,
    /// Mouse-move samples arriving sooner than this after the last
    /// recorded command are dropped; other delays are clamped up to it.
    pub minimum_delay_ms: u64,
    /// Recorded delays are clamped down to this.
    pub maximum_delay_ms: u64,
    pub mouse_mode: MouseMode,
    pub source: SourceKind,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            record_mouse_movements: true,
            record_mouse_clicks: true,
            record_keyboard: true,
            minimum_delay_ms: 0,
            maximum_delay_ms: 10_000,
            mouse_mode: MouseMode::Absolute,
            source: SourceKind::System,
        }
    }
}

impl CaptureOptions {
    pub fn minimum_delay(&self) -> Duration {
        Duration::from_millis(self.minimum_delay_ms)
    }

    pub fn maximum_delay(&self) -> Duration {
        Duration::from_millis(self.maximum_delay_ms)
    }
}

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Active,
    Paused,
    Stopped,
    /// Terminal: session setup failed.
    Error,
}

/// One recording session and what it captured so far.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    pub state: RecordingState,
    pub options: CaptureOptions,
    pub started_at: SystemTime,
    pub commands: Vec<Command>,
}

impl RecordingSession {
    fn new(options: CaptureOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecordingState::Active,
            options,
            started_at: SystemTime::now(),
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a recording session is already active")]
    AlreadyRecording,
    #[error("no active recording session")]
    NotRecording,
    #[error("recording is not paused")]
    NotPaused,
    #[error("hotkey subsystem is not ready; recording could not be stopped once started")]
    HotkeysNotReady,
    #[error("invalid capture options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}

struct CaptureInner {
    session: Option<RecordingSession>,
    source: Option<Box<dyn InputEventSource>>,
    /// Timestamp of the last recorded command (or segment start).  Not
    /// advanced by dropped samples, so a flood of thinned moves cannot
    /// starve recording forever.
    last_recorded_at: Option<Instant>,
    first_in_segment: bool,
    pressed: HashSet<KeyName>,
    last_position: Option<(u32, u32)>,
    /// Tracked absolute position for relative-mode delta computation.
    reference: Option<(i32, i32)>,
    control_keys: Vec<KeyName>,
}

struct CaptureShared {
    inner: Mutex<CaptureInner>,
    events: EventBus,
}

/// Coordinates recording sessions.  Cheap to clone; all clones share one
/// session slot.
#[derive(Clone)]
pub struct CaptureCoordinator {
    shared: Arc<CaptureShared>,
    settings: Arc<dyn RecordingControlSettings>,
    resolver: Arc<dyn SourceResolver>,
    hotkeys: Arc<dyn HotkeyReadiness>,
}

impl CaptureCoordinator {
    pub fn new(
        events: EventBus,
        settings: Arc<dyn RecordingControlSettings>,
        resolver: Arc<dyn SourceResolver>,
        hotkeys: Arc<dyn HotkeyReadiness>,
    ) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                inner: Mutex::new(CaptureInner {
                    session: None,
                    source: None,
                    last_recorded_at: None,
                    first_in_segment: true,
                    pressed: HashSet::new(),
                    last_position: None,
                    reference: None,
                    control_keys: Vec::new(),
                }),
                events: events.clone(),
            }),
            settings,
            resolver,
            hotkeys,
        }
    }

    /// Starts a recording session.
    ///
    /// Refuses while another session is active or paused, and refuses
    /// when the hotkey subsystem is not ready (a recording that cannot
    /// be stopped by its control hotkeys must never start).
    pub fn start(&self, options: CaptureOptions) -> Result<Uuid, CaptureError> {
        if options.minimum_delay() > options.maximum_delay() {
            return Err(CaptureError::InvalidOptions(
                "minimum delay exceeds maximum delay".to_string(),
            ));
        }

        {
            let inner = self.shared.lock();
            if let Some(session) = &inner.session {
                if matches!(
                    session.state,
                    RecordingState::Active | RecordingState::Paused
                ) {
                    return Err(CaptureError::AlreadyRecording);
                }
            }
        }
        if !self.hotkeys.is_ready() {
            return Err(CaptureError::HotkeysNotReady);
        }

        let mut source = self.resolver.resolve(options.source)?;
        let session = RecordingSession::new(options);
        let session_id = session.id;

        let receiver = match source.install() {
            Ok(receiver) => receiver,
            Err(e) => {
                // Setup failure is terminal for the session.
                let mut inner = self.shared.lock();
                let mut session = session;
                session.state = RecordingState::Error;
                inner.session = Some(session);
                drop(inner);
                self.shared.events.publish(EngineEvent::RecordingStateChanged {
                    session_id,
                    state: RecordingState::Error,
                });
                return Err(e.into());
            }
        };

        {
            let mut inner = self.shared.lock();
            // The early check released the lock before source setup, so a
            // concurrent start may have claimed the slot since.
            if let Some(existing) = &inner.session {
                if matches!(
                    existing.state,
                    RecordingState::Active | RecordingState::Paused
                ) {
                    drop(inner);
                    source.uninstall();
                    return Err(CaptureError::AlreadyRecording);
                }
            }
            inner.reference = source.cursor_position();
            inner.last_recorded_at = Some(Instant::now());
            inner.first_in_segment = true;
            inner.pressed.clear();
            inner.last_position = None;
            inner.control_keys = self
                .settings
                .control_hotkeys()
                .keys()
                .into_iter()
                .cloned()
                .collect();
            inner.session = Some(session);
            inner.source = Some(source);
        }

        let shared = Arc::clone(&self.shared);
        std::thread::spawn(move || {
            while let Ok(event) = receiver.recv() {
                shared.handle_event(event);
            }
        });

        info!(%session_id, "recording started");
        self.shared.events.publish(EngineEvent::RecordingStateChanged {
            session_id,
            state: RecordingState::Active,
        });
        Ok(session_id)
    }

    /// Pauses the active session; events are discarded until `resume`.
    pub fn pause(&self) -> Result<(), CaptureError> {
        let session_id = {
            let mut inner = self.shared.lock();
            let session = inner.session.as_mut().ok_or(CaptureError::NotRecording)?;
            if session.state != RecordingState::Active {
                return Err(CaptureError::NotRecording);
            }
            session.state = RecordingState::Paused;
            session.id
        };
        self.shared.events.publish(EngineEvent::RecordingStateChanged {
            session_id,
            state: RecordingState::Paused,
        });
        Ok(())
    }

    /// Resumes a paused session.  The next recorded command starts a new
    /// segment and gets a zero delay; the pause gap is never recorded.
    pub fn resume(&self) -> Result<(), CaptureError> {
        let session_id = {
            let mut inner = self.shared.lock();
            let session = inner.session.as_mut().ok_or(CaptureError::NotRecording)?;
            if session.state != RecordingState::Paused {
                return Err(CaptureError::NotPaused);
            }
            session.state = RecordingState::Active;
            let id = session.id;
            inner.first_in_segment = true;
            inner.last_recorded_at = Some(Instant::now());
            inner.pressed.clear();
            id
        };
        self.shared.events.publish(EngineEvent::RecordingStateChanged {
            session_id,
            state: RecordingState::Active,
        });
        Ok(())
    }

    /// Stops the session and returns it with everything it recorded.
    pub fn stop(&self) -> Result<RecordingSession, CaptureError> {
        self.finish(false)
    }

    /// Stops the session and discards what it recorded.
    pub fn cancel(&self) -> Result<(), CaptureError> {
        self.finish(true).map(|_| ())
    }

    fn finish(&self, discard: bool) -> Result<RecordingSession, CaptureError> {
        let (mut source, snapshot) = {
            let mut inner = self.shared.lock();
            let session = inner.session.as_mut().ok_or(CaptureError::NotRecording)?;
            if !matches!(
                session.state,
                RecordingState::Active | RecordingState::Paused
            ) {
                return Err(CaptureError::NotRecording);
            }
            session.state = RecordingState::Stopped;
            if discard {
                session.commands.clear();
            }
            let snapshot = session.clone();
            (inner.source.take(), snapshot)
        };
        if let Some(source) = source.as_mut() {
            source.uninstall();
        }
        info!(session_id = %snapshot.id, commands = snapshot.commands.len(), "recording stopped");
        self.shared.events.publish(EngineEvent::RecordingStateChanged {
            session_id: snapshot.id,
            state: RecordingState::Stopped,
        });
        Ok(snapshot)
    }

    /// Snapshot of the current (or last finished) session.
    pub fn session(&self) -> Option<RecordingSession> {
        self.shared.lock().session.clone()
    }
}

impl CaptureShared {
    fn lock(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn handle_event(&self, event: SourceEvent) {
        let (recorded, fault, session_id) = {
            let mut inner = self.lock();
            let session_id = match &inner.session {
                Some(session) if session.state == RecordingState::Active => session.id,
                _ => return,
            };
            match apply_event(&mut inner, event) {
                Ok(recorded) => (recorded, None, session_id),
                Err(message) => (None, Some(message), session_id),
            }
        };
        if let Some(command) = recorded {
            self.events.publish(EngineEvent::CommandRecorded {
                session_id,
                command,
            });
        }
        if let Some(message) = fault {
            warn!(%session_id, %message, "capture handler fault");
            self.events.publish(EngineEvent::RecordingError {
                session_id,
                message,
            });
        }
    }
}

/// Applies one raw event to the recording, returning the recorded
/// command if the event survived filtering.
fn apply_event(inner: &mut CaptureInner, event: SourceEvent) -> Result<Option<Command>, String> {
    let options = match &inner.session {
        Some(session) => session.options.clone(),
        None => return Ok(None),
    };

    match event.kind {
        SourceEventKind::MouseMove { x, y } => {
            if !options.record_mouse_movements || thinned(inner, &options, event.at) {
                return Ok(None);
            }
            match options.mouse_mode {
                MouseMode::Absolute => {
                    // Identical consecutive positions carry no information.
                    if inner.last_position == Some((x, y)) {
                        return Ok(None);
                    }
                    inner.last_position = Some((x, y));
                    Ok(Some(record(
                        inner,
                        &options,
                        event.at,
                        CommandKind::MouseMove { x, y },
                    )))
                }
                MouseMode::Relative => {
                    let current = (x as i32, y as i32);
                    let Some(previous) = inner.reference.replace(current) else {
                        // First sample seeds the reference position.
                        return Ok(None);
                    };
                    let (dx, dy) = (current.0 - previous.0, current.1 - previous.1);
                    if dx == 0 && dy == 0 {
                        return Ok(None);
                    }
                    Ok(Some(record(
                        inner,
                        &options,
                        event.at,
                        CommandKind::MouseMoveRelative { dx, dy },
                    )))
                }
            }
        }
        SourceEventKind::MouseMoveRelative { dx, dy } => {
            if !options.record_mouse_movements || thinned(inner, &options, event.at) {
                return Ok(None);
            }
            Ok(Some(record(
                inner,
                &options,
                event.at,
                CommandKind::MouseMoveRelative { dx, dy },
            )))
        }
        SourceEventKind::MouseClick { button, click } => {
            if !options.record_mouse_clicks {
                return Ok(None);
            }
            Ok(Some(record(
                inner,
                &options,
                event.at,
                CommandKind::MouseClick { button, click },
            )))
        }
        SourceEventKind::Key { key, is_down } => {
            if !options.record_keyboard {
                return Ok(None);
            }
            // Control hotkeys are matched on the key alone so a recording
            // never captures its own controls, whatever modifiers happen
            // to be held.
            if inner.control_keys.contains(&key) {
                return Ok(None);
            }
            if key.as_str() == "unknown" {
                return Err("unmapped key code from input source".to_string());
            }
            // OS auto-repeat: repeated downs without a release.
            if is_down && !inner.pressed.insert(key.clone()) {
                return Ok(None);
            }
            if !is_down && !inner.pressed.remove(&key) {
                return Ok(None);
            }
            Ok(Some(record(
                inner,
                &options,
                event.at,
                CommandKind::KeyPress { key, is_down },
            )))
        }
        SourceEventKind::Text(text) => {
            if !options.record_keyboard {
                return Ok(None);
            }
            Ok(Some(record(
                inner,
                &options,
                event.at,
                CommandKind::Keyboard { text },
            )))
        }
    }
}

/// Mouse-move thinning: drop samples arriving within the minimum delay
/// of the last recorded command.
fn thinned(inner: &CaptureInner, options: &CaptureOptions, at: Instant) -> bool {
    let minimum = options.minimum_delay();
    if minimum.is_zero() {
        return false;
    }
    match inner.last_recorded_at {
        Some(last) => at.saturating_duration_since(last) < minimum,
        None => false,
    }
}

fn record(
    inner: &mut CaptureInner,
    options: &CaptureOptions,
    at: Instant,
    kind: CommandKind,
) -> Command {
    let delay = if inner.first_in_segment {
        Duration::ZERO
    } else {
        let raw = inner
            .last_recorded_at
            .map(|last| at.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        raw.clamp(options.minimum_delay(), options.maximum_delay())
    };
    inner.first_in_segment = false;
    inner.last_recorded_at = Some(at);

    let command = Command { delay, kind };
    if let Some(session) = inner.session.as_mut() {
        session.commands.push(command.clone());
    }
    command
}
