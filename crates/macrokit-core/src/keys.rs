//! Canonical key names and their relay wire codes.
//!
//! Keys are identified throughout MacroKit by a lowercase textual name
//! (`"a"`, `"enter"`, `"f9"`).  The DSL writes these names, hotkey
//! definitions store them, and the relay protocol transmits the u16 code
//! each name maps to.  The codes are USB HID Usage IDs (keyboard/keypad
//! page 0x07) so the hardware relay and the software paths agree on one
//! canonical representation.
//!
//! A name with no table entry is kept verbatim (a "raw key name") and
//! encodes as code 0; a code with no table entry decodes as the sentinel
//! name `"unknown"`.

use serde::{Deserialize, Serialize};

/// (name, HID usage ID) pairs for every key MacroKit knows by name.
const KEY_TABLE: &[(&str, u16)] = &[
    ("a", 0x04),
    ("b", 0x05),
    ("c", 0x06),
    ("d", 0x07),
    ("e", 0x08),
    ("f", 0x09),
    ("g", 0x0A),
    ("h", 0x0B),
    ("i", 0x0C),
    ("j", 0x0D),
    ("k", 0x0E),
    ("l", 0x0F),
    ("m", 0x10),
    ("n", 0x11),
    ("o", 0x12),
    ("p", 0x13),
    ("q", 0x14),
    ("r", 0x15),
    ("s", 0x16),
    ("t", 0x17),
    ("u", 0x18),
    ("v", 0x19),
    ("w", 0x1A),
    ("x", 0x1B),
    ("y", 0x1C),
    ("z", 0x1D),
    ("1", 0x1E),
    ("2", 0x1F),
    ("3", 0x20),
    ("4", 0x21),
    ("5", 0x22),
    ("6", 0x23),
    ("7", 0x24),
    ("8", 0x25),
    ("9", 0x26),
    ("0", 0x27),
    ("enter", 0x28),
    ("escape", 0x29),
    ("backspace", 0x2A),
    ("tab", 0x2B),
    ("space", 0x2C),
    ("minus", 0x2D),
    ("equal", 0x2E),
    ("caps_lock", 0x39),
    ("f1", 0x3A),
    ("f2", 0x3B),
    ("f3", 0x3C),
    ("f4", 0x3D),
    ("f5", 0x3E),
    ("f6", 0x3F),
    ("f7", 0x40),
    ("f8", 0x41),
    ("f9", 0x42),
    ("f10", 0x43),
    ("f11", 0x44),
    ("f12", 0x45),
    ("insert", 0x49),
    ("home", 0x4A),
    ("page_up", 0x4B),
    ("delete", 0x4C),
    ("end", 0x4D),
    ("page_down", 0x4E),
    ("right", 0x4F),
    ("left", 0x50),
    ("down", 0x51),
    ("up", 0x52),
    ("ctrl", 0xE0),
    ("shift", 0xE1),
    ("alt", 0xE2),
    ("meta", 0xE3),
    ("right_ctrl", 0xE4),
    ("right_shift", 0xE5),
    ("right_alt", 0xE6),
    ("right_meta", 0xE7),
];

/// Canonical textual key identifier.
///
/// Constructed from DSL arguments (`key_down('a')`), hotkey settings, or
/// decoded relay frames.  Comparison is case-sensitive on the canonical
/// (lowercased) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyName(String);

impl KeyName {
    /// Creates a key name from its DSL spelling.
    ///
    /// A single character maps to the named key it produces (`'A'` →
    /// `"a"`, `' '` → `"space"`, `'-'` → `"minus"`); a multi-character
    /// string is treated as a raw key name and lowercased.
    pub fn parse(spelling: &str) -> Self {
        let mut chars = spelling.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => KeyName(spelling.to_ascii_lowercase()),
        }
    }

    /// Maps a single character to its named key.
    pub fn from_char(c: char) -> Self {
        let name = match c {
            ' ' => "space".to_string(),
            '-' => "minus".to_string(),
            '=' => "equal".to_string(),
            '\t' => "tab".to_string(),
            '\n' => "enter".to_string(),
            other => other.to_ascii_lowercase().to_string(),
        };
        KeyName(name)
    }

    /// Looks up the key for a relay wire code.
    ///
    /// Unmapped codes decode as the sentinel name `"unknown"` (code 0), so
    /// decoding is total and the caller decides what to do with the event.
    pub fn from_code(code: u16) -> Self {
        for (name, c) in KEY_TABLE {
            if *c == code {
                return KeyName((*name).to_string());
            }
        }
        KeyName("unknown".to_string())
    }

    /// The canonical name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The relay wire code, or 0 for raw/unknown names.
    pub fn code(&self) -> u16 {
        for (name, code) in KEY_TABLE {
            if *name == self.0 {
                return *code;
            }
        }
        0
    }

    /// Whether this name has a table entry (and therefore a nonzero code).
    pub fn is_named(&self) -> bool {
        self.code() != 0
    }
}

impl std::fmt::Display for KeyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyName {
    fn from(s: &str) -> Self {
        KeyName::parse(s)
    }
}
