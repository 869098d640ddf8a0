//! The recorded-command data model.
//!
//! A [`Command`] is one input action plus the delay since the previous
//! command in the same script.  Commands are what the capture engine
//! produces, what legacy scripts store, and what the DSL renders/parses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keys::KeyName;

/// Mouse button identifier used by commands and the relay protocol.
///
/// The numeric value of each variant is its wire byte in relay frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 0x01,
    Right = 0x02,
    Middle = 0x03,
}

impl TryFrom<u8> for MouseButton {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MouseButton::Left),
            0x02 => Ok(MouseButton::Right),
            0x03 => Ok(MouseButton::Middle),
            _ => Err(()),
        }
    }
}

impl MouseButton {
    /// The DSL argument spelling (`'left'`, `'right'`, `'middle'`).
    pub fn dsl_name(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }

    /// Parses the DSL argument spelling.
    pub fn from_dsl_name(name: &str) -> Option<Self> {
        match name {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// How a mouse button event is performed.
///
/// `Press`/`Release` are the two halves of a click recorded separately;
/// `Click` is the combined press-and-release used by replay shortcuts.
/// The numeric value of each variant is its wire byte in relay frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClickType {
    Press = 0x01,
    Release = 0x02,
    Click = 0x03,
}

impl TryFrom<u8> for ClickType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(ClickType::Press),
            0x02 => Ok(ClickType::Release),
            0x03 => Ok(ClickType::Click),
            _ => Err(()),
        }
    }
}

/// The action part of a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Move the cursor to an absolute screen position (non-negative).
    MouseMove { x: u32, y: u32 },
    /// Move the cursor by a signed offset from its current position.
    MouseMoveRelative { dx: i32, dy: i32 },
    /// Press, release, or click a mouse button.
    MouseClick { button: MouseButton, click: ClickType },
    /// Type a burst of text (a key sequence rendered as one string).
    Keyboard { text: String },
    /// Press or release a single key.
    KeyPress { key: KeyName, is_down: bool },
    /// Wait for the given duration.
    Sleep { duration: Duration },
}

/// One recorded input action.
///
/// `delay` is the time elapsed since the previous command in the same
/// script (zero for the first command of a recording segment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Time since the previous command; always non-negative.
    pub delay: Duration,
    pub kind: CommandKind,
}

impl Command {
    /// Creates a command with zero delay.
    pub fn immediate(kind: CommandKind) -> Self {
        Self {
            delay: Duration::ZERO,
            kind,
        }
    }

    /// Creates a command with the given delay since the previous command.
    pub fn after(delay: Duration, kind: CommandKind) -> Self {
        Self { delay, kind }
    }
}
