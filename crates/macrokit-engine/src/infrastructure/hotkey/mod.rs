//! Global hotkeys, via two mechanisms.
//!
//! [`LowLevelHotkeyService`] (listener.rs) matches hotkeys against the
//! raw key stream from a grab hook.  It supports trigger modes and
//! swallowing but sees synthetic input and depends on hook reliability.
//! [`NativeHotkeyRegistrar`] (native.rs) registers with the OS hotkey
//! facility, which is robust but knows nothing about trigger modes or
//! per-definition swallowing.  Both publish [`EngineEvent::HotkeyPressed`]
//! and are addressed through the same [`HotkeySource`] trait, so the
//! application picks a mechanism per platform without caring which one
//! it got.
//!
//! [`EngineEvent::HotkeyPressed`]: crate::notify::EngineEvent

mod listener;
mod native;

pub use listener::{
    HotkeyMatcher, KeyEventBackend, KeyEventHandler, LowLevelHotkeyService, MatchOutcome,
    RawKeyEvent, RdevGrabBackend,
};
pub use native::NativeHotkeyRegistrar;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use macrokit_core::HotkeyDefinition;

/// A registered hotkey and what it triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyBinding {
    pub id: Uuid,
    pub definition: HotkeyDefinition,
    /// The script this hotkey launches; `None` for engine-level bindings
    /// (recording controls, kill switch).
    pub script_id: Option<Uuid>,
}

impl HotkeyBinding {
    pub fn new(definition: HotkeyDefinition, script_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            script_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("hotkey rejected by the OS: {message}")]
    Platform { message: String },
    #[error("hotkey worker did not respond within {0:?}")]
    Timeout(Duration),
    #[error("hotkey worker has shut down")]
    WorkerGone,
    #[error("key '{0}' cannot be registered natively")]
    UnsupportedKey(String),
    #[error("no binding with id {0}")]
    UnknownBinding(Uuid),
}

/// Registration interface shared by both hotkey mechanisms.
///
/// Registering a binding whose definition duplicates an existing one
/// (same modifiers, key, and trigger mode) is an idempotent no-op.
#[async_trait]
pub trait HotkeySource: Send + Sync {
    async fn register(&self, binding: HotkeyBinding) -> Result<(), RegistrationError>;
    async fn unregister(&self, id: Uuid) -> Result<(), RegistrationError>;
}

/// Whether a hotkey mechanism is installed and able to fire.
///
/// Recording refuses to start until this reports ready, so a session can
/// always be stopped by its control hotkeys.
pub trait HotkeyReadiness: Send + Sync {
    fn is_ready(&self) -> bool;
}
