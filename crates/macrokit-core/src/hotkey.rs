//! Hotkey definition types shared by both hotkey mechanisms in the engine.

use serde::{Deserialize, Serialize};

use crate::keys::KeyName;

/// Modifier key bitmask carried by a [`HotkeyDefinition`].
///
/// Bit layout: `0x01` Ctrl, `0x02` Shift, `0x04` Alt, `0x08` Meta.
/// Left/right variants of a modifier are not distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: u8 = 0x01;
    pub const SHIFT: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const META: u8 = 0x08;

    /// Returns the modifier bit for a modifier key name, or `None` for
    /// non-modifier keys.
    pub fn bit_for_key(key: &KeyName) -> Option<u8> {
        match key.as_str() {
            "ctrl" | "right_ctrl" => Some(Self::CTRL),
            "shift" | "right_shift" => Some(Self::SHIFT),
            "alt" | "right_alt" => Some(Self::ALT),
            "meta" | "right_meta" => Some(Self::META),
            _ => None,
        }
    }

    pub fn contains(&self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    pub fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }
}

/// How a matched hotkey fires while its key is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Fire once per physical press; re-arms when the key is released.
    FireOnce,
    /// Keep firing while held, throttled to a minimum re-fire interval.
    RepeatWhileHeld,
}

/// A global hotkey: modifier set, key, trigger mode, swallow flag, label.
///
/// Two definitions conflict when their `(modifiers, key, trigger)` tuples
/// are equal; the swallow flag and display label do not participate in
/// conflict detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyDefinition {
    pub modifiers: Modifiers,
    pub key: KeyName,
    pub trigger: TriggerMode,
    /// Suppress the keystroke from reaching other applications when matched.
    pub swallow: bool,
    /// Human-readable label for UI display only.
    pub label: String,
}

impl HotkeyDefinition {
    pub fn new(modifiers: Modifiers, key: KeyName, trigger: TriggerMode) -> Self {
        let label = describe(modifiers, &key);
        Self {
            modifiers,
            key,
            trigger,
            swallow: false,
            label,
        }
    }

    /// The identity used for conflict detection and duplicate-registration
    /// checks.
    pub fn conflict_key(&self) -> (Modifiers, &KeyName, TriggerMode) {
        (self.modifiers, &self.key, self.trigger)
    }

    /// Whether two definitions collide as registrations.
    pub fn conflicts_with(&self, other: &HotkeyDefinition) -> bool {
        self.conflict_key() == other.conflict_key()
    }
}

fn describe(modifiers: Modifiers, key: &KeyName) -> String {
    let mut parts = Vec::new();
    if modifiers.contains(Modifiers::CTRL) {
        parts.push("Ctrl");
    }
    if modifiers.contains(Modifiers::SHIFT) {
        parts.push("Shift");
    }
    if modifiers.contains(Modifiers::ALT) {
        parts.push("Alt");
    }
    if modifiers.contains(Modifiers::META) {
        parts.push("Meta");
    }
    let key = key.as_str();
    if parts.is_empty() {
        key.to_string()
    } else {
        format!("{}+{}", parts.join("+"), key)
    }
}
