//! # macrokit-core
//!
//! Shared library for MacroKit containing the recorded-command data model,
//! the textual script DSL (render + parse), the relay-device binary codec,
//! and hotkey definition types.
//!
//! This crate is used by the capture/execution engine and by any front end.
//! It has zero dependencies on OS APIs, async runtimes, or UI frameworks.
//!
//! # Architecture overview
//!
//! MacroKit records live mouse/keyboard activity into a compact scripting
//! representation and replays it, either through software-level input
//! injection or through a hardware relay peripheral.  This crate is the
//! shared foundation.  It defines:
//!
//! - **`command`** – The `Command` data model: one timed input action
//!   (mouse move, click, key press, typed text, sleep) with the delay since
//!   the previous command.
//!
//! - **`keys`** – The canonical key-name table.  Keys are identified by a
//!   lowercase textual name (`"a"`, `"enter"`, `"f9"`) and carry a u16 wire
//!   code used by the relay protocol.
//!
//! - **`dsl`** – The textual script DSL produced by the capture engine and
//!   consumed by the script interpreter: one statement per line
//!   (`move(10,20)`, `mouse_click('left')`, `msleep(100)`).
//!
//! - **`relay`** – Binary encode/decode for the relay device's command set
//!   and its inbound event stream.  Fixed byte layout per frame, all
//!   multi-byte integers little-endian.
//!
//! - **`hotkey`** – `HotkeyDefinition` and modifier flags shared by both
//!   hotkey mechanisms in the engine.
//!
//! - **`script`** – The `Script` entity: named source text (or a legacy
//!   command list) plus an optional trigger hotkey.

pub mod command;
pub mod dsl;
pub mod hotkey;
pub mod keys;
pub mod relay;
pub mod script;

// Re-export the most-used types at the crate root so callers can write
// `macrokit_core::Command` instead of `macrokit_core::command::Command`.
pub use command::{ClickType, Command, CommandKind, MouseButton};
pub use dsl::{parse_script, render_commands, DslError};
pub use hotkey::{HotkeyDefinition, Modifiers, TriggerMode};
pub use keys::KeyName;
pub use relay::{
    decode_command, decode_event, encode_command, encode_event, RelayCommand, RelayCursorTracker,
    RelayError, RelayEvent,
};
pub use script::Script;
