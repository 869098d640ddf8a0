//! Translation from rdev key identifiers to canonical key names.

use macrokit_core::KeyName;

/// Maps an OS hook key to its canonical name.
///
/// Keys with no canonical table entry get a stable raw name so they
/// still round-trip through hotkey matching and the DSL, just without a
/// relay wire code.
pub fn key_name_from_rdev(key: rdev::Key) -> KeyName {
    use rdev::Key::*;

    let name: &str = match key {
        KeyA => "a",
        KeyB => "b",
        KeyC => "c",
        KeyD => "d",
        KeyE => "e",
        KeyF => "f",
        KeyG => "g",
        KeyH => "h",
        KeyI => "i",
        KeyJ => "j",
        KeyK => "k",
        KeyL => "l",
        KeyM => "m",
        KeyN => "n",
        KeyO => "o",
        KeyP => "p",
        KeyQ => "q",
        KeyR => "r",
        KeyS => "s",
        KeyT => "t",
        KeyU => "u",
        KeyV => "v",
        KeyW => "w",
        KeyX => "x",
        KeyY => "y",
        KeyZ => "z",
        Num1 => "1",
        Num2 => "2",
        Num3 => "3",
        Num4 => "4",
        Num5 => "5",
        Num6 => "6",
        Num7 => "7",
        Num8 => "8",
        Num9 => "9",
        Num0 => "0",
        Return => "enter",
        Escape => "escape",
        Backspace => "backspace",
        Tab => "tab",
        Space => "space",
        Minus => "minus",
        Equal => "equal",
        CapsLock => "caps_lock",
        F1 => "f1",
        F2 => "f2",
        F3 => "f3",
        F4 => "f4",
        F5 => "f5",
        F6 => "f6",
        F7 => "f7",
        F8 => "f8",
        F9 => "f9",
        F10 => "f10",
        F11 => "f11",
        F12 => "f12",
        Insert => "insert",
        Home => "home",
        PageUp => "page_up",
        Delete => "delete",
        End => "end",
        PageDown => "page_down",
        RightArrow => "right",
        LeftArrow => "left",
        DownArrow => "down",
        UpArrow => "up",
        ControlLeft => "ctrl",
        ShiftLeft => "shift",
        Alt => "alt",
        MetaLeft => "meta",
        ControlRight => "right_ctrl",
        ShiftRight => "right_shift",
        AltGr => "right_alt",
        MetaRight => "right_meta",
        SemiColon => "semicolon",
        Quote => "quote",
        BackSlash => "backslash",
        IntlBackslash => "intl_backslash",
        BackQuote => "backquote",
        LeftBracket => "left_bracket",
        RightBracket => "right_bracket",
        Comma => "comma",
        Dot => "dot",
        Slash => "slash",
        PrintScreen => "print_screen",
        ScrollLock => "scroll_lock",
        Pause => "pause",
        NumLock => "num_lock",
        KpReturn => "kp_enter",
        Kp0 => "kp_0",
        Kp1 => "kp_1",
        Kp2 => "kp_2",
        Kp3 => "kp_3",
        Kp4 => "kp_4",
        Kp5 => "kp_5",
        Kp6 => "kp_6",
        Kp7 => "kp_7",
        Kp8 => "kp_8",
        Kp9 => "kp_9",
        KpMinus => "kp_minus",
        KpPlus => "kp_plus",
        KpMultiply => "kp_multiply",
        KpDivide => "kp_divide",
        KpDelete => "kp_delete",
        Function => "function",
        Unknown(code) => return KeyName::parse(&format!("raw_{code}")),
    };
    KeyName::parse(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_named_keys_map_to_canonical_names() {
        assert_eq!(key_name_from_rdev(rdev::Key::KeyA).as_str(), "a");
        assert_eq!(key_name_from_rdev(rdev::Key::Return).as_str(), "enter");
        assert_eq!(key_name_from_rdev(rdev::Key::F9).as_str(), "f9");
        assert_eq!(
            key_name_from_rdev(rdev::Key::ControlRight).as_str(),
            "right_ctrl"
        );
    }

    #[test]
    fn test_mapped_keys_carry_relay_codes() {
        assert!(key_name_from_rdev(rdev::Key::KeyA).is_named());
        assert!(key_name_from_rdev(rdev::Key::Escape).is_named());
    }

    #[test]
    fn test_unknown_keys_get_stable_raw_names() {
        let key = key_name_from_rdev(rdev::Key::Unknown(0xAB));
        assert_eq!(key.as_str(), "raw_171");
        assert!(!key.is_named());
    }
}
