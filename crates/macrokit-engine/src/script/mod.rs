//! Script execution: the host-input seam and the sandboxed interpreter.
//!
//! The execution coordinator never touches an interpreter directly; it
//! hands a source string, a budget, and a cancel signal to a
//! [`ScriptExecutor`] and interprets the typed error that comes back.
//! Input reaches the host exclusively through [`HostInput`], which has a
//! software implementation (OS-level injection) and a hardware one (relay
//! frames).

mod runtime;

pub use runtime::ScriptRuntime;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::CancelSignal;
use macrokit_core::{ClickType, KeyName, MouseButton};

/// An input-injection failure surfaced by a [`HostInput`] backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InjectionError(pub String);

/// The primitives a running script can perform against the host.
///
/// The `_raw` move variants bypass any smoothing/acceleration the backend
/// would otherwise apply and position the cursor in one step.  Backends
/// without that distinction implement both identically.
pub trait HostInput: Send + Sync {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), InjectionError>;
    fn mouse_move_raw(&self, x: i32, y: i32) -> Result<(), InjectionError>;
    fn mouse_move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectionError>;
    fn mouse_move_relative_raw(&self, dx: i32, dy: i32) -> Result<(), InjectionError>;
    fn mouse_button(&self, button: MouseButton, click: ClickType) -> Result<(), InjectionError>;
    fn key(&self, key: &KeyName, is_down: bool) -> Result<(), InjectionError>;
    fn type_text(&self, text: &str) -> Result<(), InjectionError>;
}

/// Resource limits and pacing for one script run.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionBudget {
    /// Abort after this many interpreter steps.
    pub max_steps: Option<u64>,
    /// Abort once this much wall time has elapsed.
    pub max_duration: Option<Duration>,
    /// Multiplier applied to script sleeps (2.0 = twice as fast).
    pub speed: f64,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_duration: None,
            speed: 1.0,
        }
    }
}

/// Why a script run was aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The session was cancelled; callers treat this as silent.
    #[error("execution cancelled")]
    Cancelled,
    #[error("kill switch is active")]
    KillSwitch,
    #[error("step budget exhausted after {0} steps")]
    StepBudget(u64),
    #[error("time budget exhausted")]
    TimeBudget,
    #[error("input injection failed: {0}")]
    Injection(String),
    /// A genuine script fault (syntax error, runtime error in user code).
    #[error("script error: {0}")]
    Fault(String),
}

/// Executes one script source to completion or typed abort.
///
/// `steps` is the session's live step counter; implementations bump it as
/// they go so progress is observable while the script runs.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(
        &self,
        source: &str,
        budget: ExecutionBudget,
        cancel: CancelSignal,
        steps: Arc<AtomicU64>,
    ) -> Result<(), ScriptError>;
}
