//! Binary codec for relay-device frames.
//!
//! One frame per byte slice; the leading byte is the frame type, the rest
//! is the fixed payload.  All multi-byte integers are little-endian.

use thiserror::Error;

use crate::command::{ClickType, MouseButton};
use crate::relay::frames::{FrameType, RelayCommand, RelayEvent};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    /// The frame slice is empty (no type byte).
    #[error("empty frame")]
    EmptyFrame,

    /// The leading type byte is not a recognized frame type.
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The frame type is valid for the other direction only (e.g. a
    /// StatusQuery arriving on the inbound event stream).
    #[error("frame type 0x{0:02X} is not valid in this direction")]
    WrongDirection(u8),

    /// The payload is shorter than the fixed layout requires.
    #[error("truncated frame: need {needed} payload bytes, got {available}")]
    TruncatedFrame { needed: usize, available: usize },

    /// The payload is longer than the fixed layout allows.
    #[error("oversized frame: expected {expected} payload bytes, got {available}")]
    OversizedFrame { expected: usize, available: usize },

    /// A field value is out of range (unknown button byte, invalid UTF-8).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes an outbound [`RelayCommand`] into one frame.
pub fn encode_command(command: &RelayCommand) -> Vec<u8> {
    let mut buf = vec![command.frame_type() as u8];
    match command {
        RelayCommand::MoveAbsolute { x, y } => {
            buf.extend_from_slice(&x.to_le_bytes());
            buf.extend_from_slice(&y.to_le_bytes());
        }
        RelayCommand::MoveRelative { dx, dy } => {
            buf.extend_from_slice(&dx.to_le_bytes());
            buf.extend_from_slice(&dy.to_le_bytes());
        }
        RelayCommand::Click { button, click } => {
            buf.push(*button as u8);
            buf.push(*click as u8);
        }
        RelayCommand::KeyPress { code, is_down } => {
            buf.extend_from_slice(&code.to_le_bytes());
            buf.push(u8::from(*is_down));
        }
        RelayCommand::Text(text) => buf.extend_from_slice(text.as_bytes()),
        RelayCommand::Delay(millis) => buf.extend_from_slice(&millis.to_le_bytes()),
        RelayCommand::StartRecording
        | RelayCommand::StopRecording
        | RelayCommand::StatusQuery => {}
    }
    buf
}

/// Encodes an inbound [`RelayEvent`] into one frame.
///
/// Used by tests and device simulators; the production decoder is
/// [`decode_event`].
pub fn encode_event(event: &RelayEvent) -> Vec<u8> {
    let command = match event {
        RelayEvent::MoveRelative { dx, dy } => RelayCommand::MoveRelative { dx: *dx, dy: *dy },
        RelayEvent::Click { button, click } => RelayCommand::Click {
            button: *button,
            click: *click,
        },
        RelayEvent::Key { code, is_down } => RelayCommand::KeyPress {
            code: *code,
            is_down: *is_down,
        },
        RelayEvent::Text(text) => RelayCommand::Text(text.clone()),
        RelayEvent::Delay(millis) => RelayCommand::Delay(*millis),
    };
    encode_command(&command)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one outbound command frame (device-side direction).
pub fn decode_command(frame: &[u8]) -> Result<RelayCommand, RelayError> {
    let (frame_type, payload) = split_frame(frame)?;
    match frame_type {
        FrameType::MoveAbsolute => {
            let p = fixed_payload(payload, 4)?;
            Ok(RelayCommand::MoveAbsolute {
                x: i16::from_le_bytes([p[0], p[1]]),
                y: i16::from_le_bytes([p[2], p[3]]),
            })
        }
        FrameType::MoveRelative => {
            let p = fixed_payload(payload, 4)?;
            Ok(RelayCommand::MoveRelative {
                dx: i16::from_le_bytes([p[0], p[1]]),
                dy: i16::from_le_bytes([p[2], p[3]]),
            })
        }
        FrameType::Click => {
            let p = fixed_payload(payload, 2)?;
            let (button, click) = decode_click(p[0], p[1])?;
            Ok(RelayCommand::Click { button, click })
        }
        FrameType::KeyPress => {
            let p = fixed_payload(payload, 3)?;
            Ok(RelayCommand::KeyPress {
                code: u16::from_le_bytes([p[0], p[1]]),
                is_down: p[2] != 0,
            })
        }
        FrameType::Text => Ok(RelayCommand::Text(decode_text(payload)?)),
        FrameType::Delay => {
            let p = fixed_payload(payload, 4)?;
            Ok(RelayCommand::Delay(u32::from_le_bytes([
                p[0], p[1], p[2], p[3],
            ])))
        }
        FrameType::StartRecording => {
            fixed_payload(payload, 0)?;
            Ok(RelayCommand::StartRecording)
        }
        FrameType::StopRecording => {
            fixed_payload(payload, 0)?;
            Ok(RelayCommand::StopRecording)
        }
        FrameType::StatusQuery => {
            fixed_payload(payload, 0)?;
            Ok(RelayCommand::StatusQuery)
        }
    }
}

/// Decodes one inbound event frame (host-side direction).
///
/// The device only ever reports relative motion, clicks, keys, text, and
/// delays; any other frame type is rejected as [`RelayError::WrongDirection`].
pub fn decode_event(frame: &[u8]) -> Result<RelayEvent, RelayError> {
    let (frame_type, payload) = split_frame(frame)?;
    match frame_type {
        FrameType::MoveRelative => {
            let p = fixed_payload(payload, 4)?;
            Ok(RelayEvent::MoveRelative {
                dx: i16::from_le_bytes([p[0], p[1]]),
                dy: i16::from_le_bytes([p[2], p[3]]),
            })
        }
        FrameType::Click => {
            let p = fixed_payload(payload, 2)?;
            let (button, click) = decode_click(p[0], p[1])?;
            Ok(RelayEvent::Click { button, click })
        }
        FrameType::KeyPress => {
            let p = fixed_payload(payload, 3)?;
            Ok(RelayEvent::Key {
                code: u16::from_le_bytes([p[0], p[1]]),
                is_down: p[2] != 0,
            })
        }
        FrameType::Text => Ok(RelayEvent::Text(decode_text(payload)?)),
        FrameType::Delay => {
            let p = fixed_payload(payload, 4)?;
            Ok(RelayEvent::Delay(u32::from_le_bytes([
                p[0], p[1], p[2], p[3],
            ])))
        }
        other => Err(RelayError::WrongDirection(other as u8)),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn split_frame(frame: &[u8]) -> Result<(FrameType, &[u8]), RelayError> {
    let (&type_byte, payload) = frame.split_first().ok_or(RelayError::EmptyFrame)?;
    let frame_type =
        FrameType::try_from(type_byte).map_err(|_| RelayError::UnknownFrameType(type_byte))?;
    Ok((frame_type, payload))
}

/// Validates an exact fixed-size payload.
fn fixed_payload(payload: &[u8], expected: usize) -> Result<&[u8], RelayError> {
    if payload.len() < expected {
        return Err(RelayError::TruncatedFrame {
            needed: expected,
            available: payload.len(),
        });
    }
    if payload.len() > expected {
        return Err(RelayError::OversizedFrame {
            expected,
            available: payload.len(),
        });
    }
    Ok(payload)
}

fn decode_click(button_byte: u8, click_byte: u8) -> Result<(MouseButton, ClickType), RelayError> {
    let button = MouseButton::try_from(button_byte)
        .map_err(|_| RelayError::MalformedPayload(format!("unknown button: {button_byte}")))?;
    let click = ClickType::try_from(click_byte)
        .map_err(|_| RelayError::MalformedPayload(format!("unknown click type: {click_byte}")))?;
    Ok((button, click))
}

fn decode_text(payload: &[u8]) -> Result<String, RelayError> {
    std::str::from_utf8(payload)
        .map(str::to_string)
        .map_err(|e| RelayError::MalformedPayload(format!("invalid UTF-8: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
