//! Input injection backends behind the [`HostInput`] seam.
//!
//! [`EnigoHostInput`] performs software injection through the OS;
//! [`RelayHostInput`] drives the hardware relay device, which injects at
//! the USB level and is indistinguishable from a physical peripheral to
//! the target host.

use std::sync::{Arc, Mutex};

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use macrokit_core::{encode_command, ClickType, KeyName, MouseButton, RelayCommand};

use crate::script::{HostInput, InjectionError};
use crate::services::RelayConnectivity;
use crate::sync::SyntheticInputFlag;

// ── Software injection ──────────────────────────────────────────────────

/// OS-level injection.
///
/// Every call raises the synthetic-input flag for its duration so the
/// capture hooks can tell these events apart from operator input.
pub struct EnigoHostInput {
    enigo: Mutex<Enigo>,
    synthetic: SyntheticInputFlag,
}

impl EnigoHostInput {
    pub fn new(synthetic: SyntheticInputFlag) -> Result<Self, InjectionError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InjectionError(format!("input backend init failed: {e}")))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
            synthetic,
        })
    }

    fn with_enigo<F>(&self, f: F) -> Result<(), InjectionError>
    where
        F: FnOnce(&mut Enigo) -> Result<(), enigo::InputError>,
    {
        let _guard = self.synthetic.activate();
        let mut enigo = self.enigo.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut enigo).map_err(|e| InjectionError(e.to_string()))
    }
}

impl HostInput for EnigoHostInput {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        self.with_enigo(|enigo| enigo.move_mouse(x, y, Coordinate::Abs))
    }

    // The OS backend has no smoothing; raw moves are the same operation.
    fn mouse_move_raw(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        self.mouse_move(x, y)
    }

    fn mouse_move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        self.with_enigo(|enigo| enigo.move_mouse(dx, dy, Coordinate::Rel))
    }

    fn mouse_move_relative_raw(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        self.mouse_move_relative(dx, dy)
    }

    fn mouse_button(&self, button: MouseButton, click: ClickType) -> Result<(), InjectionError> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        };
        let direction = match click {
            ClickType::Press => Direction::Press,
            ClickType::Release => Direction::Release,
            ClickType::Click => Direction::Click,
        };
        self.with_enigo(|enigo| enigo.button(button, direction))
    }

    fn key(&self, key: &KeyName, is_down: bool) -> Result<(), InjectionError> {
        let key = enigo_key(key)?;
        let direction = if is_down {
            Direction::Press
        } else {
            Direction::Release
        };
        self.with_enigo(|enigo| enigo.key(key, direction))
    }

    fn type_text(&self, text: &str) -> Result<(), InjectionError> {
        self.with_enigo(|enigo| enigo.text(text))
    }
}

/// Maps a canonical key name to the OS injection key.
fn enigo_key(key: &KeyName) -> Result<Key, InjectionError> {
    let name = key.as_str();
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(Key::Unicode(c));
    }
    let key = match name {
        "enter" => Key::Return,
        "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "minus" => Key::Unicode('-'),
        "equal" => Key::Unicode('='),
        "caps_lock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" => Key::PageUp,
        "page_down" => Key::PageDown,
        "delete" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "ctrl" | "right_ctrl" => Key::Control,
        "shift" | "right_shift" => Key::Shift,
        "alt" | "right_alt" => Key::Alt,
        "meta" | "right_meta" => Key::Meta,
        other => {
            return Err(InjectionError(format!(
                "key '{other}' is not supported for software injection"
            )))
        }
    };
    Ok(key)
}

// ── Hardware injection ──────────────────────────────────────────────────

/// Replay through the hardware relay device.
pub struct RelayHostInput {
    connectivity: Arc<dyn RelayConnectivity>,
}

impl RelayHostInput {
    pub fn new(connectivity: Arc<dyn RelayConnectivity>) -> Self {
        Self { connectivity }
    }

    fn send(&self, command: &RelayCommand) -> Result<(), InjectionError> {
        self.connectivity
            .send_frame(&encode_command(command))
            .map_err(|e| InjectionError(e.to_string()))
    }
}

/// Clamps a screen coordinate into the relay wire range.
fn wire_coord(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

impl HostInput for RelayHostInput {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        self.send(&RelayCommand::MoveAbsolute {
            x: wire_coord(x),
            y: wire_coord(y),
        })
    }

    // The device positions the cursor in one report either way.
    fn mouse_move_raw(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        self.mouse_move(x, y)
    }

    fn mouse_move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        self.send(&RelayCommand::MoveRelative {
            dx: wire_coord(dx),
            dy: wire_coord(dy),
        })
    }

    fn mouse_move_relative_raw(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        self.mouse_move_relative(dx, dy)
    }

    fn mouse_button(&self, button: MouseButton, click: ClickType) -> Result<(), InjectionError> {
        self.send(&RelayCommand::Click { button, click })
    }

    fn key(&self, key: &KeyName, is_down: bool) -> Result<(), InjectionError> {
        let code = key.code();
        if code == 0 {
            return Err(InjectionError(format!(
                "key '{key}' has no relay wire code"
            )));
        }
        self.send(&RelayCommand::KeyPress { code, is_down })
    }

    fn type_text(&self, text: &str) -> Result<(), InjectionError> {
        self.send(&RelayCommand::Text(text.to_string()))
    }
}
