//! Engine notifications.
//!
//! Every observable state change is published as an [`EngineEvent`] on a
//! broadcast [`EventBus`].  Publishing never blocks and never fails: a bus
//! with no subscribers simply drops the event, and a slow subscriber that
//! falls behind the channel capacity loses the oldest events rather than
//! back-pressuring the engine.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::application::capture::RecordingState;
use crate::application::execution::ExecutionState;
use macrokit_core::Command;

const BUS_CAPACITY: usize = 256;

/// A state-change notification published by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A command was appended to the active recording session.
    CommandRecorded {
        session_id: Uuid,
        command: Command,
    },
    /// The recording session changed state.
    RecordingStateChanged {
        session_id: Uuid,
        state: RecordingState,
    },
    /// A capture handler failed; the session keeps running.
    RecordingError { session_id: Uuid, message: String },
    /// An execution session changed state.
    ExecutionStateChanged {
        session_id: Uuid,
        script_id: Uuid,
        state: ExecutionState,
    },
    /// Replay progress, as completed percentage (0..=100).
    ProgressChanged { session_id: Uuid, percent: u8 },
    /// An execution session failed.
    ExecutionError { session_id: Uuid, message: String },
    /// An execution session reached a terminal state.
    ExecutionCompleted {
        session_id: Uuid,
        script_id: Uuid,
        success: bool,
        steps: u64,
    },
    /// A registered hotkey fired.
    HotkeyPressed {
        binding_id: Uuid,
        script_id: Option<Uuid>,
        label: String,
    },
}

/// Fan-out bus for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: EngineEvent) {
        tracing::trace!(?event, "engine event");
        // A send error only means nobody is subscribed right now.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
