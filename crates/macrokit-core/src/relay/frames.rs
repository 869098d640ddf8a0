//! Relay protocol frame types.
//!
//! Wire layout per variant (all integers little-endian):
//!
//! | Type byte | Frame            | Payload                          |
//! |-----------|------------------|----------------------------------|
//! | `0x01`    | MoveAbsolute     | x:i16, y:i16                     |
//! | `0x02`    | MoveRelative     | dx:i16, dy:i16                   |
//! | `0x03`    | Click            | button:u8, click:u8              |
//! | `0x04`    | KeyPress         | code:u16, is_down:u8             |
//! | `0x05`    | Text             | raw UTF-8 bytes to end of frame  |
//! | `0x06`    | Delay            | millis:u32                       |
//! | `0x10`    | StartRecording   | (empty)                          |
//! | `0x11`    | StopRecording    | (empty)                          |
//! | `0x12`    | StatusQuery      | (empty)                          |
//!
//! Outbound [`RelayCommand`]s drive the device; inbound [`RelayEvent`]s are
//! what the device reports while recording.  The device has no notion of an
//! absolute cursor position, so its event stream only ever contains
//! relative motion.

use crate::command::{ClickType, MouseButton};

/// Frame type byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    MoveAbsolute = 0x01,
    MoveRelative = 0x02,
    Click = 0x03,
    KeyPress = 0x04,
    Text = 0x05,
    Delay = 0x06,
    StartRecording = 0x10,
    StopRecording = 0x11,
    StatusQuery = 0x12,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(FrameType::MoveAbsolute),
            0x02 => Ok(FrameType::MoveRelative),
            0x03 => Ok(FrameType::Click),
            0x04 => Ok(FrameType::KeyPress),
            0x05 => Ok(FrameType::Text),
            0x06 => Ok(FrameType::Delay),
            0x10 => Ok(FrameType::StartRecording),
            0x11 => Ok(FrameType::StopRecording),
            0x12 => Ok(FrameType::StatusQuery),
            _ => Err(()),
        }
    }
}

/// An outbound command frame sent to the relay device.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    MoveAbsolute { x: i16, y: i16 },
    MoveRelative { dx: i16, dy: i16 },
    Click { button: MouseButton, click: ClickType },
    KeyPress { code: u16, is_down: bool },
    Text(String),
    /// Pause between replayed commands, in milliseconds.
    Delay(u32),
    StartRecording,
    StopRecording,
    StatusQuery,
}

impl RelayCommand {
    pub fn frame_type(&self) -> FrameType {
        match self {
            RelayCommand::MoveAbsolute { .. } => FrameType::MoveAbsolute,
            RelayCommand::MoveRelative { .. } => FrameType::MoveRelative,
            RelayCommand::Click { .. } => FrameType::Click,
            RelayCommand::KeyPress { .. } => FrameType::KeyPress,
            RelayCommand::Text(_) => FrameType::Text,
            RelayCommand::Delay(_) => FrameType::Delay,
            RelayCommand::StartRecording => FrameType::StartRecording,
            RelayCommand::StopRecording => FrameType::StopRecording,
            RelayCommand::StatusQuery => FrameType::StatusQuery,
        }
    }
}

/// An inbound event frame reported by the relay device while recording.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    MoveRelative { dx: i16, dy: i16 },
    Click { button: MouseButton, click: ClickType },
    Key { code: u16, is_down: bool },
    Text(String),
    /// Time elapsed since the previous event, in milliseconds.
    Delay(u32),
}
