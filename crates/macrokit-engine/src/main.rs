//! MacroKit engine entry point.
//!
//! Wires the coordinators to their infrastructure and runs headless:
//! hotkeys trigger scripts from the in-memory catalog, the event bus is
//! logged, and Ctrl-C terminates every live session before exit.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ EngineConfig          -- from MACROKIT_CONFIG, or defaults
//!  └─ EventBus              -- every observable state change
//!  └─ hotkey subsystem      -- native registrar + low-level listener
//!  └─ CaptureCoordinator    -- records from the resolved input source
//!  └─ ExecutionCoordinator  -- replays through OS or relay injection
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use macrokit_core::Script;
use macrokit_engine::application::capture::{CaptureCoordinator, RecordingState};
use macrokit_engine::application::execution::{ExecutionCoordinator, ExecutionOptions};
use macrokit_engine::infrastructure::config::EngineConfig;
use macrokit_engine::infrastructure::hotkey::{
    HotkeyBinding, HotkeyReadiness, HotkeySource, LowLevelHotkeyService, NativeHotkeyRegistrar,
    RdevGrabBackend,
};
use macrokit_engine::infrastructure::inject::{EnigoHostInput, RelayHostInput};
use macrokit_engine::infrastructure::source::DefaultSourceResolver;
use macrokit_engine::notify::{EngineEvent, EventBus};
use macrokit_engine::script::{HostInput, ScriptRuntime};
use macrokit_engine::services::{
    InMemoryScriptCatalog, LoopbackRelay, RecordingControlSettings, RelayConnectivity,
    ScriptCatalog, StaticControlSettings, StaticSafetyGate,
};
use macrokit_engine::sync::SyntheticInputFlag;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("MacroKit engine starting");

    let config = load_config()?;
    let events = EventBus::new();
    let synthetic = SyntheticInputFlag::new();

    // ── Services ──────────────────────────────────────────────────────────────
    let catalog: Arc<dyn ScriptCatalog> = Arc::new(InMemoryScriptCatalog::new());
    let safety = Arc::new(StaticSafetyGate::new());
    let connectivity: Arc<dyn RelayConnectivity> = Arc::new(LoopbackRelay::connected());
    let settings = Arc::new(StaticControlSettings::new(
        config.controls.to_control_keys(),
    ));

    // ── Hotkey subsystem ──────────────────────────────────────────────────────
    let native = Arc::new(NativeHotkeyRegistrar::new(events.clone()));
    let listener = Arc::new(LowLevelHotkeyService::new(events.clone()));
    match listener.start(Box::new(RdevGrabBackend::new(synthetic.clone()))) {
        Ok(()) => info!("low-level hotkey listener started"),
        Err(e) => warn!(%e, "low-level hotkey listener unavailable; using native registrar only"),
    }

    // Recording controls (F9/F10/F11 by default) are engine-level
    // bindings: no script id, dispatched by binding id in the event pump.
    let controls = settings.control_hotkeys();
    let start_stop = HotkeyBinding::new(controls.start_stop.clone(), None);
    let pause_resume = HotkeyBinding::new(controls.pause_resume.clone(), None);
    let cancel_recording = HotkeyBinding::new(controls.cancel.clone(), None);
    let (start_stop_id, pause_resume_id, cancel_id) =
        (start_stop.id, pause_resume.id, cancel_recording.id);
    for binding in [start_stop, pause_resume, cancel_recording] {
        let label = binding.definition.label.clone();
        if let Err(e) = listener.register(binding).await {
            warn!(%label, %e, "could not register recording control hotkey");
        }
    }

    // ── Coordinators ──────────────────────────────────────────────────────────
    let resolver = Arc::new(DefaultSourceResolver::new(Arc::clone(&connectivity)));
    let readiness: Arc<dyn HotkeyReadiness> = if listener.is_ready() {
        listener.clone()
    } else {
        native.clone()
    };
    let capture = CaptureCoordinator::new(events.clone(), settings, resolver, readiness);

    let software: Arc<dyn HostInput> = match EnigoHostInput::new(synthetic.clone()) {
        Ok(host) => Arc::new(host),
        Err(e) => {
            warn!(%e, "software injection unavailable; falling back to relay injection");
            Arc::new(RelayHostInput::new(Arc::clone(&connectivity)))
        }
    };
    let hardware: Arc<dyn HostInput> = Arc::new(RelayHostInput::new(Arc::clone(&connectivity)));
    let execution = ExecutionCoordinator::new(
        events.clone(),
        Arc::clone(&catalog),
        Arc::clone(&safety) as Arc<dyn macrokit_engine::services::SafetyGate>,
        Arc::clone(&connectivity),
        Arc::new(ScriptRuntime::new(software, Arc::clone(&safety) as _)),
        Arc::new(ScriptRuntime::new(hardware, Arc::clone(&safety) as _)),
    );

    // ── Demo script + trigger ─────────────────────────────────────────────────
    let demo = Script::new(
        "demo",
        "move(100,100)\nmsleep(200)\nmouse_click('left')\ntype_text('hello from macrokit')",
    );
    let demo_id = demo.id;
    catalog.put(demo);
    match native
        .register(HotkeyBinding::new(default_trigger(), Some(demo_id)))
        .await
    {
        Ok(()) => info!("demo script bound to Ctrl+Shift+M"),
        Err(e) => warn!(%e, "could not register demo hotkey"),
    }

    // ── Event pump: hotkeys launch scripts or drive recording ────────────────
    let mut rx = events.subscribe();
    let pump_execution = execution.clone();
    let pump_capture = capture.clone();
    let pump_options = config.execution.clone();
    let capture_options = config.capture.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                EngineEvent::HotkeyPressed {
                    script_id: Some(script_id),
                    label,
                    ..
                } => {
                    info!(%label, %script_id, "hotkey fired; launching script");
                    if let Err(e) = pump_execution.start(script_id, pump_options.clone()).await {
                        error!(%e, "hotkey-triggered start failed");
                    }
                }
                EngineEvent::HotkeyPressed {
                    script_id: None,
                    binding_id,
                    label,
                } => {
                    let result = if binding_id == start_stop_id {
                        if pump_capture.session().map(|s| s.state).is_some_and(|s| {
                            matches!(s, RecordingState::Active | RecordingState::Paused)
                        }) {
                            pump_capture.stop().map(|_| ())
                        } else {
                            pump_capture.start(capture_options.clone()).map(|_| ())
                        }
                    } else if binding_id == pause_resume_id {
                        if pump_capture
                            .session()
                            .is_some_and(|s| s.state == RecordingState::Paused)
                        {
                            pump_capture.resume()
                        } else {
                            pump_capture.pause()
                        }
                    } else if binding_id == cancel_id {
                        pump_capture.cancel()
                    } else {
                        Ok(())
                    };
                    if let Err(e) = result {
                        warn!(%label, %e, "recording control hotkey had no effect");
                    }
                }
                other => info!(?other, "engine event"),
            }
        }
    });

    // Kick the demo once so a headless run shows the whole path.
    match execution.start(demo_id, ExecutionOptions::default()).await {
        Ok(session_id) => info!(%session_id, "demo execution launched"),
        Err(e) => warn!(%e, "demo execution not started"),
    }

    info!("MacroKit engine ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let terminated = execution.terminate_all();
    if terminated > 0 {
        info!(terminated, "live sessions terminated");
    }
    if capture.session().is_some() {
        let _ = capture.cancel();
    }

    info!("MacroKit engine stopped");
    Ok(())
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var("MACROKIT_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config = EngineConfig::from_toml_str(&text)?;
            info!(%path, "configuration loaded");
            Ok(config)
        }
        Err(_) => Ok(EngineConfig::default()),
    }
}

fn default_trigger() -> macrokit_core::HotkeyDefinition {
    use macrokit_core::{HotkeyDefinition, KeyName, Modifiers, TriggerMode};
    HotkeyDefinition::new(
        Modifiers(Modifiers::CTRL | Modifiers::SHIFT),
        KeyName::parse("m"),
        TriggerMode::FireOnce,
    )
}
