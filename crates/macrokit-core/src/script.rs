//! The `Script` entity.
//!
//! A script is owned by an external catalog; this crate only defines its
//! shape and the rules for resolving its executable source.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::Command;
use crate::dsl::render_commands;
use crate::hotkey::HotkeyDefinition;

/// A named, replayable script.
///
/// Modern scripts carry DSL `source` text directly; legacy scripts carry a
/// recorded `commands` list that renders losslessly into the DSL on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: Uuid,
    pub name: String,
    /// The textual DSL source; may be empty for legacy command scripts.
    pub source: String,
    /// Legacy recorded command list, renderable into the DSL.
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Optional single trigger hotkey.
    pub trigger: Option<HotkeyDefinition>,
    pub modified_at: SystemTime,
}

impl Script {
    /// Creates a new script with DSL source text.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source: source.into(),
            commands: Vec::new(),
            trigger: None,
            modified_at: SystemTime::now(),
        }
    }

    /// Creates a legacy script from a recorded command list.
    pub fn from_commands(name: impl Into<String>, commands: Vec<Command>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source: String::new(),
            commands,
            trigger: None,
            modified_at: SystemTime::now(),
        }
    }

    /// Replaces the source text and bumps the modified timestamp.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.touch();
    }

    /// Bumps the modified timestamp.
    pub fn touch(&mut self) {
        self.modified_at = SystemTime::now();
    }

    /// Resolves the executable source text.
    ///
    /// Returns the script's own source when non-empty, otherwise renders
    /// the legacy command list into the DSL.  `None` when the script has
    /// neither.
    pub fn resolve_source(&self) -> Option<String> {
        if !self.source.trim().is_empty() {
            return Some(self.source.clone());
        }
        if !self.commands.is_empty() {
            return Some(render_commands(&self.commands));
        }
        None
    }
}
