//! Engine configuration loaded from a TOML file.
//!
//! Every field has a default, so a missing file or an empty string is a
//! valid configuration.

use serde::{Deserialize, Serialize};

use macrokit_core::{HotkeyDefinition, KeyName, Modifiers, TriggerMode};

use crate::application::capture::CaptureOptions;
use crate::application::execution::ExecutionOptions;
use crate::services::RecordingControlKeys;

/// Key names for the reserved recording-control hotkeys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlKeysConfig {
    pub start_stop: String,
    pub pause_resume: String,
    pub cancel: String,
}

impl Default for ControlKeysConfig {
    fn default() -> Self {
        Self {
            start_stop: "f9".to_string(),
            pause_resume: "f10".to_string(),
            cancel: "f11".to_string(),
        }
    }
}

impl ControlKeysConfig {
    /// Builds the control hotkey definitions.  Control hotkeys always
    /// fire once and swallow their keystroke.
    pub fn to_control_keys(&self) -> RecordingControlKeys {
        let reserved = |name: &str| {
            let mut def = HotkeyDefinition::new(
                Modifiers::NONE,
                KeyName::parse(name),
                TriggerMode::FireOnce,
            );
            def.swallow = true;
            def
        };
        RecordingControlKeys {
            start_stop: reserved(&self.start_stop),
            pause_resume: reserved(&self.pause_resume),
            cancel: reserved(&self.cancel),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureOptions,
    pub execution: ExecutionOptions,
    pub controls: ControlKeysConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
