//! Integration tests for the execution pipeline.
//!
//! Coordinator lifecycle tests drive a scripted executor double;
//! end-to-end tests run real DSL source through the Lua runtime against
//! a recording host.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use macrokit_core::{ClickType, Command, CommandKind, KeyName, MouseButton, Script};
use macrokit_engine::application::execution::{
    ExecutionCoordinator, ExecutionError, ExecutionOptions, ExecutionState, ReplayMode,
};
use macrokit_engine::notify::{EngineEvent, EventBus};
use macrokit_engine::script::{
    ExecutionBudget, HostInput, InjectionError, ScriptError, ScriptExecutor, ScriptRuntime,
};
use macrokit_engine::services::{
    InMemoryScriptCatalog, LoopbackRelay, RelayConnectivity, SafetyGate, ScriptCatalog,
    StaticSafetyGate,
};
use macrokit_engine::sync::CancelSignal;

// ── Test doubles ──────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Behavior {
    /// Return success immediately.
    Complete,
    /// Return the given error immediately.
    Fail(ScriptError),
    /// Block until cancelled.
    WaitForCancel,
}

/// Executor double that records the sources and budgets it was asked to
/// run with.
struct ScriptedExecutor {
    behavior: Behavior,
    sources: Mutex<Vec<String>>,
    budgets: Mutex<Vec<ExecutionBudget>>,
}

impl ScriptedExecutor {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            sources: Mutex::new(Vec::new()),
            budgets: Mutex::new(Vec::new()),
        })
    }

    fn sources(&self) -> Vec<String> {
        self.sources.lock().expect("lock poisoned").clone()
    }

    fn budgets(&self) -> Vec<ExecutionBudget> {
        self.budgets.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        source: &str,
        budget: ExecutionBudget,
        cancel: CancelSignal,
        _steps: Arc<AtomicU64>,
    ) -> Result<(), ScriptError> {
        self.sources
            .lock()
            .expect("lock poisoned")
            .push(source.to_string());
        self.budgets.lock().expect("lock poisoned").push(budget);
        match &self.behavior {
            Behavior::Complete => Ok(()),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::WaitForCancel => {
                cancel.cancelled().await;
                Err(ScriptError::Cancelled)
            }
        }
    }
}

struct Harness {
    coordinator: ExecutionCoordinator,
    catalog: Arc<InMemoryScriptCatalog>,
    safety: Arc<StaticSafetyGate>,
    events: EventBus,
}

fn harness(executor: Arc<ScriptedExecutor>) -> Harness {
    let events = EventBus::new();
    let catalog = Arc::new(InMemoryScriptCatalog::new());
    let safety = Arc::new(StaticSafetyGate::new());
    let coordinator = ExecutionCoordinator::new(
        events.clone(),
        Arc::clone(&catalog) as Arc<dyn ScriptCatalog>,
        Arc::clone(&safety) as Arc<dyn SafetyGate>,
        Arc::new(LoopbackRelay::disconnected()) as Arc<dyn RelayConnectivity>,
        Arc::clone(&executor) as Arc<dyn ScriptExecutor>,
        executor,
    );
    Harness {
        coordinator,
        catalog,
        safety,
        events,
    }
}

fn put_script(catalog: &InMemoryScriptCatalog, source: &str) -> Uuid {
    let script = Script::new("test-script", source);
    let id = script.id;
    catalog.put(script);
    id
}

/// Waits until the script has no live session left.
async fn wait_until_settled(coordinator: &ExecutionCoordinator, script_id: Uuid) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while coordinator.status(script_id).is_some() {
        assert!(Instant::now() < deadline, "session did not settle in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Coordinator lifecycle ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_completed_run_publishes_success_and_is_retained() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(Arc::clone(&executor));
    let mut rx = h.events.subscribe();
    let script_id = put_script(&h.catalog, "move(1,1)");

    let session_id = h
        .coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    // Completed session is retained for statistics.
    let current = h.coordinator.current().expect("retained session");
    assert_eq!(current.session_id, session_id);
    assert_eq!(current.state, ExecutionState::Completed);
    assert_eq!(h.coordinator.running_count(), 0);

    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::ExecutionCompleted {
            session_id: id,
            success,
            ..
        } = event
        {
            assert_eq!(id, session_id);
            assert!(success);
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn test_start_rejects_unknown_empty_and_duplicate_scripts() {
    let executor = ScriptedExecutor::new(Behavior::WaitForCancel);
    let h = harness(executor);

    // Unknown script.
    assert!(matches!(
        h.coordinator.start(Uuid::new_v4(), ExecutionOptions::default()).await,
        Err(ExecutionError::ScriptNotFound(_))
    ));

    // Empty name.
    let unnamed = Script::new("   ", "move(1,1)");
    let unnamed_id = unnamed.id;
    h.catalog.put(unnamed);
    assert!(matches!(
        h.coordinator.start(unnamed_id, ExecutionOptions::default()).await,
        Err(ExecutionError::EmptyName)
    ));

    // Empty source.
    let empty = Script::new("empty", "  \n");
    let empty_id = empty.id;
    h.catalog.put(empty);
    assert!(matches!(
        h.coordinator.start(empty_id, ExecutionOptions::default()).await,
        Err(ExecutionError::EmptySource)
    ));

    // One live session per script.
    let script_id = put_script(&h.catalog, "move(1,1)");
    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        h.coordinator.start(script_id, ExecutionOptions::default()).await,
        Err(ExecutionError::AlreadyRunning(id)) if id == script_id
    ));

    h.coordinator.terminate_all();
}

#[tokio::test]
async fn test_scripts_from_different_ids_run_concurrently() {
    let executor = ScriptedExecutor::new(Behavior::WaitForCancel);
    let h = harness(executor);
    let first = put_script(&h.catalog, "move(1,1)");
    let second = {
        let script = Script::new("other", "move(2,2)");
        let id = script.id;
        h.catalog.put(script);
        id
    };

    h.coordinator
        .start(first, ExecutionOptions::default())
        .await
        .unwrap();
    h.coordinator
        .start(second, ExecutionOptions::default())
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while h.coordinator.running_count() < 2 {
        assert!(Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(h.coordinator.terminate_all(), 2);
    wait_until_settled(&h.coordinator, first).await;
    wait_until_settled(&h.coordinator, second).await;
    // Terminated sessions are not retained as "current".
    assert!(h.coordinator.current().is_none());
}

#[tokio::test]
async fn test_stop_requires_interactive_mode() {
    let executor = ScriptedExecutor::new(Behavior::WaitForCancel);
    let h = harness(executor);
    let script_id = put_script(&h.catalog, "move(1,1)");

    h.coordinator
        .start(
            script_id,
            ExecutionOptions {
                mode: ReplayMode::RunOnly,
                ..ExecutionOptions::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        h.coordinator.stop(),
        Err(ExecutionError::NotInteractive)
    ));
    assert!(matches!(
        h.coordinator.pause(),
        Err(ExecutionError::NotInteractive)
    ));

    // Terminate-all ends even run-only sessions.
    assert_eq!(h.coordinator.terminate_all(), 1);
    wait_until_settled(&h.coordinator, script_id).await;
}

#[tokio::test]
async fn test_stop_cancels_silently_without_an_error_event() {
    let executor = ScriptedExecutor::new(Behavior::WaitForCancel);
    let h = harness(executor);
    let mut rx = h.events.subscribe();
    let script_id = put_script(&h.catalog, "move(1,1)");

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    // Let the session task get going before stopping it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.coordinator.stop().unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::ExecutionError { .. } => panic!("stop must not report an error"),
            EngineEvent::ExecutionCompleted { .. } => {
                panic!("stopped session must not report completion")
            }
            EngineEvent::ExecutionStateChanged { state, .. } => states.push(state),
            _ => {}
        }
    }
    assert_eq!(states, vec![ExecutionState::Running, ExecutionState::Stopped]);
    // A stopped session is not retained as "current".
    assert!(h.coordinator.current().is_none());
}

#[tokio::test]
async fn test_pause_and_resume_toggle_the_current_session() {
    let executor = ScriptedExecutor::new(Behavior::WaitForCancel);
    let h = harness(executor);
    let script_id = put_script(&h.catalog, "move(1,1)");

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();

    h.coordinator.pause().unwrap();
    assert_eq!(
        h.coordinator.status(script_id).unwrap().state,
        ExecutionState::Paused
    );
    assert!(matches!(
        h.coordinator.pause(),
        Err(ExecutionError::NotRunning)
    ));

    h.coordinator.resume().unwrap();
    assert_eq!(
        h.coordinator.status(script_id).unwrap().state,
        ExecutionState::Running
    );
    assert!(matches!(
        h.coordinator.resume(),
        Err(ExecutionError::NotPaused)
    ));

    h.coordinator.terminate_all();
}

#[tokio::test]
async fn test_failed_run_reports_error_and_is_not_retained() {
    let executor = ScriptedExecutor::new(Behavior::Fail(ScriptError::StepBudget(10)));
    let h = harness(executor);
    let mut rx = h.events.subscribe();
    let script_id = put_script(&h.catalog, "while true do end");

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::ExecutionError { message, .. } => {
                assert!(message.contains("step budget"));
                saw_error = true;
            }
            EngineEvent::ExecutionCompleted { success, .. } => assert!(!success),
            _ => {}
        }
    }
    assert!(saw_error);
    assert!(h.coordinator.current().is_none());
}

#[tokio::test]
async fn test_wall_clock_budget_counts_the_countdown() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(Arc::clone(&executor));
    let mut rx = h.events.subscribe();
    let script_id = put_script(&h.catalog, "move(1,1)");

    h.coordinator
        .start(
            script_id,
            ExecutionOptions {
                countdown_ms: 100,
                max_duration_ms: Some(20),
                ..ExecutionOptions::default()
            },
        )
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    // The budget expired during the countdown: the interpreter never ran.
    assert!(executor.sources().is_empty());
    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::ExecutionError { message, .. } = event {
            assert!(message.contains("time budget"));
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_interpreter_gets_only_the_remaining_wall_clock_budget() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(Arc::clone(&executor));
    let script_id = put_script(&h.catalog, "move(1,1)");

    h.coordinator
        .start(
            script_id,
            ExecutionOptions {
                countdown_ms: 50,
                max_duration_ms: Some(10_000),
                ..ExecutionOptions::default()
            },
        )
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    let budgets = executor.budgets();
    assert_eq!(budgets.len(), 1);
    // The countdown already consumed part of the ten-second budget.
    let remaining = budgets[0].max_duration.expect("duration budget");
    assert!(remaining <= Duration::from_millis(9_950));
}

#[tokio::test]
async fn test_tripped_kill_switch_fails_fast() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(Arc::clone(&executor));
    let script_id = put_script(&h.catalog, "move(1,1)");
    h.safety.trip();

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    // The executor never ran.
    assert!(executor.sources().is_empty());
    assert!(h.coordinator.current().is_none());
}

#[tokio::test]
async fn test_hardware_mode_requires_relay_connection() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(executor);
    let script_id = put_script(&h.catalog, "move(1,1)");

    assert!(matches!(
        h.coordinator
            .start(
                script_id,
                ExecutionOptions {
                    hardware: true,
                    ..ExecutionOptions::default()
                },
            )
            .await,
        Err(ExecutionError::RelayNotConnected)
    ));
}

#[tokio::test]
async fn test_step_is_never_supported() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(executor);
    assert!(matches!(
        h.coordinator.step(),
        Err(ExecutionError::StepNotSupported)
    ));
}

#[tokio::test]
async fn test_legacy_command_scripts_execute_via_rendered_source() {
    let executor = ScriptedExecutor::new(Behavior::Complete);
    let h = harness(Arc::clone(&executor));

    let script = Script::from_commands(
        "legacy",
        vec![
            Command::immediate(CommandKind::MouseMove { x: 7, y: 8 }),
            Command::after(
                Duration::from_millis(120),
                CommandKind::MouseClick {
                    button: MouseButton::Left,
                    click: ClickType::Click,
                },
            ),
        ],
    );
    let script_id = script.id;
    h.catalog.put(script);

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    assert_eq!(
        executor.sources(),
        vec!["move(7,8)\nmsleep(120)\nmouse_click('left')\n".to_string()]
    );
}

// ── End to end through the Lua runtime ────────────────────────────────────────

/// Records every injected primitive with a timestamp.
#[derive(Default)]
struct RecordingHost {
    calls: Mutex<Vec<(Instant, String)>>,
}

impl RecordingHost {
    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    fn record(&self, call: String) -> Result<(), InjectionError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push((Instant::now(), call));
        Ok(())
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
    fn mouse_button(&self, button: MouseButton, click: ClickType) -> Result<(), InjectionError> {
        self.record(format!("button({},{:?})", button.dsl_name(), click))
    }
    fn key(&self, key: &KeyName, is_down: bool) -> Result<(), InjectionError> {
        self.record(format!("key({key},{is_down})"))
    }
    fn type_text(&self, text: &str) -> Result<(), InjectionError> {
        self.record(format!("text({text})"))
    }
}

fn lua_harness(host: Arc<RecordingHost>) -> Harness {
    let events = EventBus::new();
    let catalog = Arc::new(InMemoryScriptCatalog::new());
    let safety = Arc::new(StaticSafetyGate::new());
    let runtime = Arc::new(ScriptRuntime::new(
        host as Arc<dyn HostInput>,
        Arc::clone(&safety) as Arc<dyn SafetyGate>,
    ));
    let coordinator = ExecutionCoordinator::new(
        events.clone(),
        Arc::clone(&catalog) as Arc<dyn ScriptCatalog>,
        Arc::clone(&safety) as Arc<dyn SafetyGate>,
        Arc::new(LoopbackRelay::disconnected()) as Arc<dyn RelayConnectivity>,
        Arc::clone(&runtime) as Arc<dyn ScriptExecutor>,
        runtime,
    );
    Harness {
        coordinator,
        catalog,
        safety,
        events,
    }
}

#[tokio::test]
async fn test_recorded_dsl_replays_primitives_in_order() {
    let host = Arc::new(RecordingHost::default());
    let h = lua_harness(Arc::clone(&host));
    let script_id = put_script(
        &h.catalog,
        "move(10,20)\nmsleep(30)\nmouse_click('left')\ntype_text('hi')",
    );

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    assert_eq!(
        host.calls(),
        vec![
            "move(10,20)".to_string(),
            "button(left,Click)".to_string(),
            "text(hi)".to_string(),
        ]
    );
    assert_eq!(
        h.coordinator.current().unwrap().state,
        ExecutionState::Completed
    );
}

#[tokio::test]
async fn test_stop_interrupts_a_script_sleep_promptly() {
    let host = Arc::new(RecordingHost::default());
    let h = lua_harness(Arc::clone(&host));
    let script_id = put_script(&h.catalog, "move(1,1)\nmsleep(10000)\nmove(2,2)");

    h.coordinator
        .start(script_id, ExecutionOptions::default())
        .await
        .unwrap();

    // Wait for the first primitive so we know the sleep is underway.
    let deadline = Instant::now() + Duration::from_secs(2);
    while host.calls().is_empty() {
        assert!(Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stopped_at = Instant::now();
    h.coordinator.stop().unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    // Cancellation latency is bounded by one sleep slice, not the
    // remaining sleep.
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(host.calls(), vec!["move(1,1)".to_string()]);
}

#[tokio::test]
async fn test_step_budget_aborts_runaway_script_through_the_stack() {
    let host = Arc::new(RecordingHost::default());
    let h = lua_harness(host);
    let mut rx = h.events.subscribe();
    let script_id = put_script(&h.catalog, "while true do end");

    h.coordinator
        .start(
            script_id,
            ExecutionOptions {
                max_steps: Some(1000),
                ..ExecutionOptions::default()
            },
        )
        .await
        .unwrap();
    wait_until_settled(&h.coordinator, script_id).await;

    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::ExecutionError { message, .. } = event {
            assert!(message.contains("step budget"));
            saw_error = true;
        }
    }
    assert!(saw_error);
}
