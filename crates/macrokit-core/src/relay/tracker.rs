//! Locally tracked cursor position for the relay event stream.
//!
//! The relay device reports motion only as relative deltas.  The host keeps
//! a running position so that click events can be annotated with the
//! coordinates at which they happened; the tracked position has no other
//! consumer and is never sent back to the device.

use crate::relay::frames::RelayEvent;

/// Accumulates relative motion from inbound relay events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCursorTracker {
    x: i32,
    y: i32,
}

impl RelayCursorTracker {
    /// Starts tracking from the given seed position (usually the host
    /// cursor position when recording begins).
    pub fn seeded(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Applies an event's motion to the tracked position.
    ///
    /// Non-motion events leave the position unchanged.
    pub fn apply(&mut self, event: &RelayEvent) {
        if let RelayEvent::MoveRelative { dx, dy } = event {
            self.x = self.x.saturating_add(i32::from(*dx));
            self.y = self.y.saturating_add(i32::from(*dy));
        }
    }

    /// The current tracked position.
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}
