//! The execution coordinator: the table of running script sessions and
//! their lifecycle.
//!
//! # How replay works (for beginners)
//!
//! `start` validates the script, picks the software or hardware
//! executor, and spawns a background task per session.  The task runs
//! the pre-flight sequence (kill-switch check, countdown, pause gate)
//! and then delegates the whole script to the [`ScriptExecutor`]; the
//! coordinator never interprets statements itself.  Control operations
//! act on the most recently started live session and work through the
//! session's [`CancelSignal`] and [`PauseGate`], so stopping a replay
//! mid-sleep takes at most one sleep slice.
//!
//! Scripts run concurrently — one session per script, many scripts at a
//! time.  A "current" pointer is derived from the table (highest start
//! sequence) rather than stored, so it can never dangle.  The most
//! recently completed session is retained for statistics until the next
//! start.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::notify::{EngineEvent, EventBus};
use crate::script::{ExecutionBudget, ScriptError, ScriptExecutor};
use crate::services::{RelayConnectivity, SafetyGate, ScriptCatalog};
use crate::sync::{CancelSignal, PauseGate};

/// Whether a session accepts control operations while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Pause, resume, and stop are available.
    #[default]
    Interactive,
    /// Fire-and-forget: only terminate-all can end it early.
    RunOnly,
}

/// Per-session replay options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub mode: ReplayMode,
    /// Multiplier applied to script sleeps (2.0 = twice as fast).
    pub speed: f64,
    /// Delay before the first statement runs.
    pub countdown_ms: u64,
    /// Abort after this many interpreter steps.
    pub max_steps: Option<u64>,
    /// Abort once this much wall time has elapsed.
    pub max_duration_ms: Option<u64>,
    /// Replay through the hardware relay device instead of OS injection.
    pub hardware: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            mode: ReplayMode::Interactive,
            speed: 1.0,
            countdown_ms: 0,
            max_steps: None,
            max_duration_ms: None,
            hardware: false,
        }
    }
}

impl ExecutionOptions {
    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    fn budget(&self) -> ExecutionBudget {
        ExecutionBudget {
            max_steps: self.max_steps,
            max_duration: self.max_duration_ms.map(Duration::from_millis),
            speed: self.speed,
        }
    }
}

/// Lifecycle state of an execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Paused,
    /// Terminal: ran to the end.
    Completed,
    /// Terminal: stopped by the operator.
    Stopped,
    /// Terminal: terminate-all (kill switch or shutdown).
    Terminated,
    /// Terminal: aborted with an error.
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Stopped
                | ExecutionState::Terminated
                | ExecutionState::Failed
        )
    }
}

/// Point-in-time view of one session.
#[derive(Debug, Clone)]
pub struct ExecutionStatus {
    pub session_id: Uuid,
    pub script_id: Uuid,
    pub script_name: String,
    pub state: ExecutionState,
    pub steps: u64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("script {0} not found")]
    ScriptNotFound(Uuid),
    #[error("script {0} already has a running session")]
    AlreadyRunning(Uuid),
    #[error("script name must not be empty")]
    EmptyName,
    #[error("script has neither source text nor recorded commands")]
    EmptySource,
    #[error("relay device is not connected")]
    RelayNotConnected,
    #[error("no session to control")]
    NoSession,
    #[error("session is not interactive")]
    NotInteractive,
    #[error("session is not running")]
    NotRunning,
    #[error("session is not paused")]
    NotPaused,
    #[error("single stepping is not supported: a script runs as one unit")]
    StepNotSupported,
}

struct SessionShared {
    session_id: Uuid,
    script_id: Uuid,
    script_name: String,
    options: ExecutionOptions,
    started_at: Instant,
    steps: Arc<AtomicU64>,
    state: Mutex<ExecutionState>,
    error: Mutex<Option<String>>,
}

impl SessionShared {
    fn state(&self) -> ExecutionState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Transitions to `new` unless the session already reached a
    /// terminal state.  Returns whether the transition happened.
    fn transition(&self, new: ExecutionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.is_terminal() {
            return false;
        }
        *state = new;
        true
    }

    fn set_error(&self, message: String) {
        let mut error = self.error.lock().unwrap_or_else(|p| p.into_inner());
        *error = Some(message);
    }

    fn status(&self) -> ExecutionStatus {
        ExecutionStatus {
            session_id: self.session_id,
            script_id: self.script_id,
            script_name: self.script_name.clone(),
            state: self.state(),
            steps: self.steps.load(Ordering::Relaxed),
            elapsed: self.started_at.elapsed(),
            error: self
                .error
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone(),
        }
    }
}

#[derive(Clone)]
struct Entry {
    shared: Arc<SessionShared>,
    cancel: CancelSignal,
    gate: PauseGate,
    seq: u64,
}

#[derive(Default)]
struct ExecTable {
    /// Live sessions, keyed by script id (one session per script).
    sessions: HashMap<Uuid, Entry>,
    next_seq: u64,
    /// Most recently completed session, kept until the next start.
    last_completed: Option<ExecutionStatus>,
}

impl ExecTable {
    /// Most recently started live session.
    fn current(&self) -> Option<&Entry> {
        self.sessions.values().max_by_key(|entry| entry.seq)
    }
}

/// Coordinates script execution sessions.  Cheap to clone; all clones
/// share one session table.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    table: Arc<Mutex<ExecTable>>,
    events: EventBus,
    catalog: Arc<dyn ScriptCatalog>,
    safety: Arc<dyn SafetyGate>,
    connectivity: Arc<dyn RelayConnectivity>,
    software: Arc<dyn ScriptExecutor>,
    hardware: Arc<dyn ScriptExecutor>,
}

impl ExecutionCoordinator {
    pub fn new(
        events: EventBus,
        catalog: Arc<dyn ScriptCatalog>,
        safety: Arc<dyn SafetyGate>,
        connectivity: Arc<dyn RelayConnectivity>,
        software: Arc<dyn ScriptExecutor>,
        hardware: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self {
            table: Arc::new(Mutex::new(ExecTable::default())),
            events,
            catalog,
            safety,
            connectivity,
            software,
            hardware,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExecTable> {
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Starts a replay session for a script.
    pub async fn start(
        &self,
        script_id: Uuid,
        options: ExecutionOptions,
    ) -> Result<Uuid, ExecutionError> {
        let script = self
            .catalog
            .get(script_id)
            .ok_or(ExecutionError::ScriptNotFound(script_id))?;
        if script.name.trim().is_empty() {
            return Err(ExecutionError::EmptyName);
        }
        // Legacy command scripts render into the DSL here; from this
        // point on there is only source text.
        let source = script.resolve_source().ok_or(ExecutionError::EmptySource)?;
        if options.hardware && !self.connectivity.is_connected() {
            return Err(ExecutionError::RelayNotConnected);
        }

        let entry = {
            let mut table = self.lock();
            if let Some(existing) = table.sessions.get(&script_id) {
                if !existing.shared.state().is_terminal() {
                    return Err(ExecutionError::AlreadyRunning(script_id));
                }
                table.sessions.remove(&script_id);
            }
            table.last_completed = None;

            table.next_seq += 1;
            let entry = Entry {
                shared: Arc::new(SessionShared {
                    session_id: Uuid::new_v4(),
                    script_id,
                    script_name: script.name.clone(),
                    options: options.clone(),
                    started_at: Instant::now(),
                    steps: Arc::new(AtomicU64::new(0)),
                    state: Mutex::new(ExecutionState::Running),
                    error: Mutex::new(None),
                }),
                cancel: CancelSignal::new(),
                gate: PauseGate::new(),
                seq: table.next_seq,
            };
            table.sessions.insert(script_id, entry.clone());
            entry
        };

        let session_id = entry.shared.session_id;
        info!(%session_id, %script_id, name = %script.name, "execution started");

        let executor = if options.hardware {
            Arc::clone(&self.hardware)
        } else {
            Arc::clone(&self.software)
        };
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run_session(entry, source, executor).await;
        });
        Ok(session_id)
    }

    async fn run_session(
        &self,
        entry: Entry,
        source: String,
        executor: Arc<dyn ScriptExecutor>,
    ) {
        let shared = &entry.shared;
        let session_id = shared.session_id;
        let script_id = shared.script_id;

        self.events.publish(EngineEvent::ExecutionStateChanged {
            session_id,
            script_id,
            state: ExecutionState::Running,
        });
        self.events.publish(EngineEvent::ProgressChanged {
            session_id,
            percent: 0,
        });

        let result = self.drive(&entry, &source, executor).await;

        let steps = shared.steps.load(Ordering::Relaxed);
        match result {
            Ok(()) => {
                if shared.transition(ExecutionState::Completed) {
                    self.events.publish(EngineEvent::ProgressChanged {
                        session_id,
                        percent: 100,
                    });
                    self.events.publish(EngineEvent::ExecutionStateChanged {
                        session_id,
                        script_id,
                        state: ExecutionState::Completed,
                    });
                    self.events.publish(EngineEvent::ExecutionCompleted {
                        session_id,
                        script_id,
                        success: true,
                        steps,
                    });
                    info!(%session_id, steps, "execution completed");
                }
            }
            // Stop and terminate already published their state change;
            // cancellation itself is silent.
            Err(ScriptError::Cancelled) => {
                info!(%session_id, "execution cancelled");
            }
            Err(e) => {
                if shared.transition(ExecutionState::Failed) {
                    shared.set_error(e.to_string());
                    error!(%session_id, %e, "execution failed");
                    self.events.publish(EngineEvent::ExecutionStateChanged {
                        session_id,
                        script_id,
                        state: ExecutionState::Failed,
                    });
                    self.events.publish(EngineEvent::ExecutionError {
                        session_id,
                        message: e.to_string(),
                    });
                    self.events.publish(EngineEvent::ExecutionCompleted {
                        session_id,
                        script_id,
                        success: false,
                        steps,
                    });
                }
            }
        }

        // Cleanup: remove this session from the table (a newer session
        // for the same script may already have replaced the slot).
        let mut table = self.lock();
        let ours = table
            .sessions
            .get(&script_id)
            .map(|e| e.shared.session_id == session_id)
            .unwrap_or(false);
        if ours {
            table.sessions.remove(&script_id);
        }
        if shared.state() == ExecutionState::Completed {
            table.last_completed = Some(shared.status());
        }
    }

    /// Pre-flight and delegation for one session.
    async fn drive(
        &self,
        entry: &Entry,
        source: &str,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Result<(), ScriptError> {
        let shared = &entry.shared;

        // Fail fast rather than replay into a tripped kill switch.
        if self.safety.is_kill_switch_active() {
            return Err(ScriptError::KillSwitch);
        }

        let countdown = shared.options.countdown();
        if !countdown.is_zero() {
            tokio::select! {
                _ = entry.cancel.cancelled() => return Err(ScriptError::Cancelled),
                _ = tokio::time::sleep(countdown) => {}
            }
        }

        if shared.options.mode == ReplayMode::Interactive {
            tokio::select! {
                _ = entry.cancel.cancelled() => return Err(ScriptError::Cancelled),
                _ = entry.gate.wait_until_resumed() => {}
            }
        }
        if self.safety.is_kill_switch_active() {
            return Err(ScriptError::KillSwitch);
        }

        // The wall-clock budget spans the whole session, countdown and
        // pause time included, so the interpreter only gets what is left.
        let mut budget = shared.options.budget();
        if let Some(max_duration) = budget.max_duration {
            let remaining = max_duration.saturating_sub(shared.started_at.elapsed());
            if remaining.is_zero() {
                return Err(ScriptError::TimeBudget);
            }
            budget.max_duration = Some(remaining);
        }

        executor
            .execute(
                source,
                budget,
                entry.cancel.clone(),
                Arc::clone(&shared.steps),
            )
            .await
    }

    fn current_entry(&self) -> Result<Entry, ExecutionError> {
        self.lock().current().cloned().ok_or(ExecutionError::NoSession)
    }

    /// Pauses the current interactive session.
    pub fn pause(&self) -> Result<Uuid, ExecutionError> {
        let entry = self.current_entry()?;
        if entry.shared.options.mode != ReplayMode::Interactive {
            return Err(ExecutionError::NotInteractive);
        }
        if entry.shared.state() != ExecutionState::Running {
            return Err(ExecutionError::NotRunning);
        }
        entry.shared.transition(ExecutionState::Paused);
        entry.gate.pause();
        self.events.publish(EngineEvent::ExecutionStateChanged {
            session_id: entry.shared.session_id,
            script_id: entry.shared.script_id,
            state: ExecutionState::Paused,
        });
        Ok(entry.shared.session_id)
    }

    /// Resumes the current paused session.
    pub fn resume(&self) -> Result<Uuid, ExecutionError> {
        let entry = self.current_entry()?;
        if entry.shared.state() != ExecutionState::Paused {
            return Err(ExecutionError::NotPaused);
        }
        entry.shared.transition(ExecutionState::Running);
        entry.gate.resume();
        self.events.publish(EngineEvent::ExecutionStateChanged {
            session_id: entry.shared.session_id,
            script_id: entry.shared.script_id,
            state: ExecutionState::Running,
        });
        Ok(entry.shared.session_id)
    }

    /// Stops the current interactive session.
    pub fn stop(&self) -> Result<Uuid, ExecutionError> {
        let entry = self.current_entry()?;
        if entry.shared.options.mode != ReplayMode::Interactive {
            return Err(ExecutionError::NotInteractive);
        }
        entry.shared.transition(ExecutionState::Stopped);
        self.events.publish(EngineEvent::ExecutionStateChanged {
            session_id: entry.shared.session_id,
            script_id: entry.shared.script_id,
            state: ExecutionState::Stopped,
        });
        entry.cancel.cancel();
        entry.gate.resume();
        info!(session_id = %entry.shared.session_id, "execution stopped");
        Ok(entry.shared.session_id)
    }

    /// Terminates every live session, interactive or not.  This is the
    /// kill-switch and shutdown path.
    pub fn terminate_all(&self) -> usize {
        // Snapshot under the lock, signal after releasing it, so a
        // session's cleanup can re-take the lock without deadlocking.
        let doomed: Vec<Entry> = {
            let table = self.lock();
            table
                .sessions
                .values()
                .filter(|entry| !entry.shared.state().is_terminal())
                .cloned()
                .collect()
        };
        for entry in &doomed {
            entry.shared.transition(ExecutionState::Terminated);
            self.events.publish(EngineEvent::ExecutionStateChanged {
                session_id: entry.shared.session_id,
                script_id: entry.shared.script_id,
                state: ExecutionState::Terminated,
            });
            entry.cancel.cancel();
            entry.gate.resume();
        }
        if !doomed.is_empty() {
            warn!(count = doomed.len(), "terminated all execution sessions");
        }
        doomed.len()
    }

    /// Single-stepping always fails: a script executes as one unit.
    pub fn step(&self) -> Result<(), ExecutionError> {
        Err(ExecutionError::StepNotSupported)
    }

    /// Status of the session for a script, if one is live.
    pub fn status(&self, script_id: Uuid) -> Option<ExecutionStatus> {
        self.lock()
            .sessions
            .get(&script_id)
            .map(|entry| entry.shared.status())
    }

    /// The current view: the most recently started live session, or the
    /// retained last-completed session.
    pub fn current(&self) -> Option<ExecutionStatus> {
        let table = self.lock();
        table
            .current()
            .map(|entry| entry.shared.status())
            .or_else(|| table.last_completed.clone())
    }

    pub fn running_count(&self) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|entry| !entry.shared.state().is_terminal())
            .count()
    }
}
