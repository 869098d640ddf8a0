//! Relay-device protocol: frame types, binary codec, and cursor tracking.
//!
//! The relay device is a hardware peripheral that performs input injection
//! at the USB level and can also report the operator's own input back as an
//! event stream.  Frames are fixed-layout: one leading command-type byte,
//! then the payload, all multi-byte integers little-endian.  Framing (one
//! frame per transfer) is the transport's responsibility.

pub mod codec;
pub mod frames;
pub mod tracker;

pub use codec::{decode_command, decode_event, encode_command, encode_event, RelayError};
pub use frames::{RelayCommand, RelayEvent};
pub use tracker::RelayCursorTracker;
