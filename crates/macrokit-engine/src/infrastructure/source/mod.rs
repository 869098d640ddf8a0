//! The input-event source seam the capture coordinator records from.
//!
//! A source is installed once per recording session and pushes
//! timestamped [`SourceEvent`]s into a channel until uninstalled.  Three
//! implementations exist: the OS hook ([`SystemInputSource`]), the
//! hardware relay stream ([`RelayDeviceSource`]), and the scripted
//! [`MockInputSource`] for tests.
//!
//! Events carry their own capture timestamp so delay computation is a
//! pure function of the event stream, not of when the pump thread got
//! around to a sample.

mod mock;
mod relay;
mod system;

pub use mock::{MockInputSource, MockSourceHandle};
pub use relay::RelayDeviceSource;
pub use system::SystemInputSource;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::{RelayConnectivity, RelayIoError};
use macrokit_core::{ClickType, KeyName, MouseButton};

/// Which physical source a recording session captures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The host OS input hook.
    #[default]
    System,
    /// The hardware relay device's recording stream.
    Relay,
}

/// One raw input sample with the instant it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub at: Instant,
    pub kind: SourceEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEventKind {
    MouseMove { x: u32, y: u32 },
    MouseMoveRelative { dx: i32, dy: i32 },
    MouseClick { button: MouseButton, click: ClickType },
    Key { key: KeyName, is_down: bool },
    /// A burst of typed text (relay sources only).
    Text(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input source is already installed")]
    AlreadyInstalled,
    #[error("failed to install input source: {0}")]
    Install(String),
    #[error(transparent)]
    Relay(#[from] RelayIoError),
}

/// A stream of raw input events.
///
/// `install` starts delivery and hands back the receiving end; dropping
/// the receiver or calling `uninstall` ends the stream.
pub trait InputEventSource: Send {
    fn install(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SourceError>;
    fn uninstall(&mut self);

    /// The cursor position to seed relative-motion recording from, when
    /// the source knows one.
    fn cursor_position(&self) -> Option<(i32, i32)> {
        None
    }
}

/// Builds the source for a requested [`SourceKind`].
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, kind: SourceKind) -> Result<Box<dyn InputEventSource>, SourceError>;
}

/// Production resolver: OS hook for [`SourceKind::System`], relay stream
/// for [`SourceKind::Relay`].
pub struct DefaultSourceResolver {
    connectivity: Arc<dyn RelayConnectivity>,
}

impl DefaultSourceResolver {
    pub fn new(connectivity: Arc<dyn RelayConnectivity>) -> Self {
        Self { connectivity }
    }
}

impl SourceResolver for DefaultSourceResolver {
    fn resolve(&self, kind: SourceKind) -> Result<Box<dyn InputEventSource>, SourceError> {
        match kind {
            SourceKind::System => Ok(Box::new(SystemInputSource::new())),
            SourceKind::Relay => {
                if !self.connectivity.is_connected() {
                    return Err(SourceError::Relay(RelayIoError::NotConnected));
                }
                Ok(Box::new(RelayDeviceSource::new(Arc::clone(
                    &self.connectivity,
                ))))
            }
        }
    }
}
