//! The sandboxed Lua runtime behind [`ScriptExecutor`].
//!
//! Every DSL statement is a valid Lua call, so a recorded script loads as
//! a Lua chunk with the input primitives registered as globals; hand
//! written scripts additionally get Lua's string/table/math libraries and
//! control flow for free.  No io, os, or package library is loaded, so a
//! script cannot touch anything but the registered primitives.
//!
//! Abort handling works through a latch rather than control flow: the
//! per-instruction governor hook and the primitives record a typed
//! [`ScriptError`] in the latch and raise a plain Lua error to unwind the
//! chunk.  After the chunk returns, the latch wins over whatever Lua
//! reported, so `pcall` in user code cannot mask a cancellation or a
//! budget abort.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mlua::{HookTriggers, Lua, LuaOptions, StdLib};
use tokio::task;
use tracing::debug;

use crate::script::{ExecutionBudget, HostInput, ScriptError, ScriptExecutor};
use crate::services::SafetyGate;
use crate::sync::CancelSignal;
use macrokit_core::{ClickType, KeyName, MouseButton};

/// Sleeps are carved into slices no longer than this so cancellation and
/// the kill switch are honoured mid-sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

type AbortLatch = Arc<Mutex<Option<ScriptError>>>;

/// Lua-backed [`ScriptExecutor`].
///
/// Each `execute` call builds a fresh interpreter on a blocking worker
/// thread; nothing persists between runs.
pub struct ScriptRuntime {
    host: Arc<dyn HostInput>,
    safety: Arc<dyn SafetyGate>,
}

impl ScriptRuntime {
    pub fn new(host: Arc<dyn HostInput>, safety: Arc<dyn SafetyGate>) -> Self {
        Self { host, safety }
    }
}

#[async_trait]
impl ScriptExecutor for ScriptRuntime {
    async fn execute(
        &self,
        source: &str,
        budget: ExecutionBudget,
        cancel: CancelSignal,
        steps: Arc<AtomicU64>,
    ) -> Result<(), ScriptError> {
        let host = Arc::clone(&self.host);
        let safety = Arc::clone(&self.safety);
        let source = strip_hash_comments(source);

        let outcome = task::spawn_blocking(move || {
            run_chunk(&source, budget, cancel, steps, host, safety)
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(join_error) => Err(ScriptError::Fault(format!(
                "interpreter worker failed: {join_error}"
            ))),
        }
    }
}

/// Rewrites `#` comment lines as blank lines so DSL comments survive the
/// Lua chunk loader while line numbers in error messages stay accurate.
fn strip_hash_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn run_chunk(
    source: &str,
    budget: ExecutionBudget,
    cancel: CancelSignal,
    steps: Arc<AtomicU64>,
    host: Arc<dyn HostInput>,
    safety: Arc<dyn SafetyGate>,
) -> Result<(), ScriptError> {
    let lua = Lua::new_with(StdLib::STRING | StdLib::TABLE | StdLib::MATH, LuaOptions::default())
        .map_err(|e| ScriptError::Fault(format!("interpreter init failed: {e}")))?;

    let latch: AbortLatch = Arc::new(Mutex::new(None));
    let speed = sanitize_speed(budget.speed);
    let deadline = budget.max_duration.map(|limit| Instant::now() + limit);

    install_governor(&lua, &budget, deadline, &cancel, &safety, &steps, &latch);
    register_primitives(&lua, &host, &cancel, &safety, &latch, speed)
        .map_err(|e| ScriptError::Fault(format!("primitive registration failed: {e}")))?;

    let result = lua.load(source).exec();

    let aborted = take_latched(&latch);
    match (result, aborted) {
        // The latch always wins: a script-level pcall cannot mask an abort.
        (_, Some(reason)) => Err(reason),
        (Ok(()), None) => Ok(()),
        (Err(lua_error), None) => Err(ScriptError::Fault(lua_error.to_string())),
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

/// Installs the per-instruction governor.
///
/// Check order is fixed: cancellation, kill switch, step budget, time
/// budget.  The first trigger latches and unwinds the chunk.
fn install_governor(
    lua: &Lua,
    budget: &ExecutionBudget,
    deadline: Option<Instant>,
    cancel: &CancelSignal,
    safety: &Arc<dyn SafetyGate>,
    steps: &Arc<AtomicU64>,
    latch: &AbortLatch,
) {
    let cancel = cancel.clone();
    let safety = Arc::clone(safety);
    let steps = Arc::clone(steps);
    let latch = Arc::clone(latch);
    let max_steps = budget.max_steps;
    let run_steps = AtomicU64::new(0);

    lua.set_hook(
        HookTriggers::new().every_nth_instruction(1),
        move |_lua, _debug| {
            let taken = run_steps.fetch_add(1, Ordering::Relaxed) + 1;
            steps.fetch_add(1, Ordering::Relaxed);

            if cancel.is_cancelled() {
                return Err(abort(&latch, ScriptError::Cancelled));
            }
            if safety.is_kill_switch_active() {
                return Err(abort(&latch, ScriptError::KillSwitch));
            }
            if let Some(limit) = max_steps {
                if taken > limit {
                    return Err(abort(&latch, ScriptError::StepBudget(limit)));
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(abort(&latch, ScriptError::TimeBudget));
                }
            }
            Ok(())
        },
    );
}

/// Latches the abort reason (first writer wins) and returns the Lua error
/// used to unwind the chunk.
fn abort(latch: &AbortLatch, reason: ScriptError) -> mlua::Error {
    let mut slot = latch.lock().unwrap_or_else(|p| p.into_inner());
    if slot.is_none() {
        debug!(%reason, "script run aborted");
        *slot = Some(reason);
    }
    mlua::Error::RuntimeError("macro aborted".to_string())
}

fn take_latched(latch: &AbortLatch) -> Option<ScriptError> {
    let mut slot = latch.lock().unwrap_or_else(|p| p.into_inner());
    slot.take()
}

fn register_primitives(
    lua: &Lua,
    host: &Arc<dyn HostInput>,
    cancel: &CancelSignal,
    safety: &Arc<dyn SafetyGate>,
    latch: &AbortLatch,
    speed: f64,
) -> mlua::Result<()> {
    let globals = lua.globals();

    // Absolute and relative cursor moves, smoothed and raw.
    {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            "move",
            lua.create_function(move |_, (x, y): (f64, f64)| {
                host.mouse_move(x.round() as i32, y.round() as i32)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }
    {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            "move_raw",
            lua.create_function(move |_, (x, y): (f64, f64)| {
                host.mouse_move_raw(x.round() as i32, y.round() as i32)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }
    {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            "move_rel",
            lua.create_function(move |_, (dx, dy): (f64, f64)| {
                host.mouse_move_relative(dx.round() as i32, dy.round() as i32)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }
    {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            "move_rel_raw",
            lua.create_function(move |_, (dx, dy): (f64, f64)| {
                host.mouse_move_relative_raw(dx.round() as i32, dy.round() as i32)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }

    // Mouse buttons.
    for (name, click) in [
        ("mouse_down", ClickType::Press),
        ("mouse_release", ClickType::Release),
        ("mouse_click", ClickType::Click),
    ] {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            name,
            lua.create_function(move |_, button: String| {
                let button = MouseButton::from_dsl_name(&button).ok_or_else(|| {
                    mlua::Error::RuntimeError(format!("unknown mouse button '{button}'"))
                })?;
                host.mouse_button(button, click)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }

    // Keys and text.
    for (name, is_down) in [("key_down", true), ("key_release", false)] {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            name,
            lua.create_function(move |_, spelling: String| {
                if spelling.is_empty() {
                    return Err(mlua::Error::RuntimeError("empty key name".to_string()));
                }
                host.key(&KeyName::parse(&spelling), is_down)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }
    {
        let host = Arc::clone(host);
        let latch = Arc::clone(latch);
        globals.set(
            "type_text",
            lua.create_function(move |_, text: String| {
                host.type_text(&text)
                    .map_err(|e| abort(&latch, ScriptError::Injection(e.to_string())))
            })?,
        )?;
    }

    // Sleeps, scaled by replay speed and sliced for cancellation.
    for (name, millis_per_unit) in [("sleep", 1000.0), ("msleep", 1.0)] {
        let cancel = cancel.clone();
        let safety = Arc::clone(safety);
        let latch = Arc::clone(latch);
        globals.set(
            name,
            lua.create_function(move |_, amount: f64| {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(mlua::Error::RuntimeError(
                        "sleep duration must be non-negative".to_string(),
                    ));
                }
                let total = Duration::from_secs_f64(amount * millis_per_unit / 1000.0 / speed);
                sliced_sleep(total, &cancel, &safety, &latch)
            })?,
        )?;
    }

    Ok(())
}

/// Blocking sleep in bounded slices, re-checking abort conditions between
/// slices so cancellation latency stays under one slice.
fn sliced_sleep(
    total: Duration,
    cancel: &CancelSignal,
    safety: &Arc<dyn SafetyGate>,
    latch: &AbortLatch,
) -> mlua::Result<()> {
    let mut remaining = total;
    loop {
        if cancel.is_cancelled() {
            return Err(abort(latch, ScriptError::Cancelled));
        }
        if safety.is_kill_switch_active() {
            return Err(abort(latch, ScriptError::KillSwitch));
        }
        if remaining.is_zero() {
            return Ok(());
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::StaticSafetyGate;
    use crate::script::InjectionError;
    use std::sync::Mutex as StdMutex;

    /// Records every injected primitive, optionally failing all calls.
    #[derive(Default)]
    struct RecordingHost {
        calls: StdMutex<Vec<String>>,
        should_fail: bool,
    }

    impl RecordingHost {
        fn failing() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn record(&self, call: String) -> Result<(), InjectionError> {
            if self.should_fail {
                return Err(InjectionError("device unplugged".to_string()));
            }
            self.calls.lock().expect("lock poisoned").push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock poisoned").clone()
        }
    }

    impl HostInput for RecordingHost {
        fn mouse_move(&self, x: i32, y: i32) -> Result<(), InjectionError> {
            self.record(format!("move({x},{y})"))
        }
        fn mouse_move_raw(&self, x: i32, y: i32) -> Result<(), InjectionError> {
            self.record(format!("move_raw({x},{y})"))
        }
        fn mouse_move_relative(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
            self.record(format!("move_rel({dx},{dy})"))
        }
        fn mouse_move_relative_raw(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
            self.record(format!("move_rel_raw({dx},{dy})"))
        }
        fn mouse_button(
            &self,
            button: MouseButton,
            click: ClickType,
        ) -> Result<(), InjectionError> {
            self.record(format!("button({},{:?})", button.dsl_name(), click))
        }
        fn key(&self, key: &KeyName, is_down: bool) -> Result<(), InjectionError> {
            self.record(format!("key({key},{is_down})"))
        }
        fn type_text(&self, text: &str) -> Result<(), InjectionError> {
            self.record(format!("text({text})"))
        }
    }

    fn runtime_with(host: Arc<RecordingHost>) -> ScriptRuntime {
        ScriptRuntime::new(host, Arc::new(StaticSafetyGate::new()))
    }

    fn fresh_steps() -> Arc<AtomicU64> {
        Arc::new(AtomicU64::new(0))
    }

    #[tokio::test]
    async fn test_executes_dsl_statements_in_order() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(Arc::clone(&host));

        runtime
            .execute(
                "move(10,20)\nmouse_click('left')\ntype_text('hi')",
                ExecutionBudget::default(),
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap();

        assert_eq!(
            host.calls(),
            vec![
                "move(10,20)".to_string(),
                "button(left,Click)".to_string(),
                "text(hi)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_hash_comment_lines_are_ignored() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(Arc::clone(&host));

        runtime
            .execute(
                "# recorded yesterday\nmove(1,1)\n  # indented comment\n",
                ExecutionBudget::default(),
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap();

        assert_eq!(host.calls(), vec!["move(1,1)".to_string()]);
    }

    #[tokio::test]
    async fn test_scripts_can_use_lua_control_flow() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(Arc::clone(&host));

        runtime
            .execute(
                "for i = 1, 3 do\n  move(i, i)\nend",
                ExecutionBudget::default(),
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap();

        assert_eq!(
            host.calls(),
            vec![
                "move(1,1)".to_string(),
                "move(2,2)".to_string(),
                "move(3,3)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_step_budget_aborts_infinite_loop() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let budget = ExecutionBudget {
            max_steps: Some(1),
            ..ExecutionBudget::default()
        };
        let err = runtime
            .execute(
                "while true do end",
                budget,
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ScriptError::StepBudget(1));
    }

    #[tokio::test]
    async fn test_time_budget_aborts_long_sleep() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let budget = ExecutionBudget {
            max_duration: Some(Duration::from_millis(30)),
            ..ExecutionBudget::default()
        };
        let err = runtime
            .execute(
                // Two sleeps: the governor fires on the instruction after
                // the first sleep returns.
                "msleep(80)\nmsleep(80)",
                budget,
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ScriptError::TimeBudget);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep_within_a_slice() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let cancel = CancelSignal::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                runtime
                    .execute(
                        "msleep(10000)",
                        ExecutionBudget::default(),
                        cancel,
                        fresh_steps(),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        cancel.cancel();
        let result = task.await.unwrap();

        assert_eq!(result.unwrap_err(), ScriptError::Cancelled);
        // One sleep slice plus scheduling slack, nowhere near 10s.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_pcall_cannot_mask_an_abort() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let cancel = CancelSignal::new();
        cancel.cancel();
        let err = runtime
            .execute(
                "pcall(function() move(1,1) end)",
                ExecutionBudget::default(),
                cancel,
                fresh_steps(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ScriptError::Cancelled);
    }

    #[tokio::test]
    async fn test_injection_failure_surfaces_typed_error() {
        let host = Arc::new(RecordingHost::failing());
        let runtime = runtime_with(host);

        let err = runtime
            .execute(
                "move(1,1)",
                ExecutionBudget::default(),
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ScriptError::Injection("device unplugged".to_string())
        );
    }

    #[tokio::test]
    async fn test_syntax_error_is_a_fault() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let err = runtime
            .execute(
                "move(1,",
                ExecutionBudget::default(),
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ScriptError::Fault(_)));
    }

    #[tokio::test]
    async fn test_kill_switch_aborts_mid_run() {
        let host = Arc::new(RecordingHost::default());
        let safety = Arc::new(StaticSafetyGate::new());
        safety.trip();
        let runtime = ScriptRuntime::new(host, safety);

        let err = runtime
            .execute(
                "move(1,1)",
                ExecutionBudget::default(),
                CancelSignal::new(),
                fresh_steps(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ScriptError::KillSwitch);
    }

    #[tokio::test]
    async fn test_speed_scales_sleep_duration() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let budget = ExecutionBudget {
            speed: 100.0,
            ..ExecutionBudget::default()
        };
        let started = Instant::now();
        runtime
            .execute("msleep(2000)", budget, CancelSignal::new(), fresh_steps())
            .await
            .unwrap();

        // 2s at 100x is 20ms.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_steps_counter_advances_during_run() {
        let host = Arc::new(RecordingHost::default());
        let runtime = runtime_with(host);

        let steps = fresh_steps();
        runtime
            .execute(
                "for i = 1, 10 do move(i, i) end",
                ExecutionBudget::default(),
                CancelSignal::new(),
                Arc::clone(&steps),
            )
            .await
            .unwrap();

        assert!(steps.load(Ordering::Relaxed) > 10);
    }
}
