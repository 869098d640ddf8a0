//! MacroKit engine: input capture, script execution, and global hotkeys.
//!
//! # Architecture (for beginners)
//!
//! The engine is split the same way on every axis:
//!
//! - `application/` holds the two coordinators.  [`CaptureCoordinator`]
//!   turns a raw input-event stream into recorded commands;
//!   [`ExecutionCoordinator`] owns the table of running script sessions
//!   and their lifecycle (start, pause, stop, terminate).
//! - `script/` is the sandboxed interpreter the execution coordinator
//!   delegates to, plus the [`HostInput`] seam it injects input through.
//! - `infrastructure/` adapts the outside world: OS input hooks, the
//!   hardware relay device, hotkey registration, input injection, and
//!   configuration files.
//! - `services` defines the narrow traits coordinators depend on
//!   (script catalog, relay connectivity, safety gate) so tests can swap
//!   in doubles without touching any OS facility.
//!
//! Everything observable crosses one [`notify::EventBus`]; nothing in the
//! engine calls back into a UI directly.

pub mod application;
pub mod infrastructure;
pub mod notify;
pub mod script;
pub mod services;
pub mod sync;

pub use application::capture::{CaptureCoordinator, CaptureError, CaptureOptions, RecordingState};
pub use application::execution::{
    ExecutionCoordinator, ExecutionError, ExecutionOptions, ExecutionState, ExecutionStatus,
    ReplayMode,
};
pub use notify::{EngineEvent, EventBus};
pub use script::{HostInput, InjectionError, ScriptError, ScriptExecutor};
