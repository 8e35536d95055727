//! # Actuator Link
//!
//! Demo executable: wires the runtime to a loopback actuator, issues a few
//! correlated calls, streams signed low-level commands for a short while and
//! shuts down on completion or Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use link_clients::api::{motion_switcher, sport};
use link_clients::{Ack, AngleUnit, Service, SportMotion};
use link_runtime::{LinkRuntime, LoopbackActuator, Reply, RuntimeConfig};
use link_telemetry::{init_logging, TelemetryConfig};
use link_types::lowlevel::ACTIVE_JOINTS;
use link_types::status::codes;
use link_types::SportModeState;

/// How long the low-level command stream runs.
const STREAM_DURATION: Duration = Duration::from_millis(500);
/// Loopback state period.
const STATE_INTERVAL: Duration = Duration::from_millis(20);

const SERVICE_LIST: &str = r#"[
    {"name":"sport_mode","protect":1,"status":0,"version":"1.1.6"},
    {"name":"obstacles_avoid","protect":0,"status":1,"version":"1.0.2"}
]"#;

/// Start the loopback actuator with canned replies.
fn start_actuator(runtime: &LinkRuntime) -> Result<Arc<LoopbackActuator>> {
    let actuator = Arc::new(LoopbackActuator::new(runtime.transport_handle()));
    for service in [Service::Sport, Service::MotionSwitcher, Service::RobotState] {
        actuator
            .serve(service.request_topic())
            .with_context(|| format!("Failed to serve {}", service.request_topic()))?;
    }
    actuator.set_reply(
        Service::MotionSwitcher.request_topic(),
        motion_switcher::GET_MODE,
        Reply::ok(r#"{"form":"0","name":"normal"}"#),
    );
    actuator.set_reply(
        Service::Sport.request_topic(),
        sport::FRONT_FLIP,
        Reply::error(codes::REQUEST_REJECTED),
    );
    actuator.set_reply(
        Service::Sport.request_topic(),
        sport::STAND_UP,
        Reply::ok("").after(Duration::from_millis(50)),
    );
    actuator
        .accept_commands()
        .context("Failed to accept low-level commands")?;
    actuator
        .start_state_stream(runtime.config().low_level.state_rate.topic(), STATE_INTERVAL)
        .context("Failed to start state stream")?;
    Ok(actuator)
}

async fn run_demo(runtime: &LinkRuntime, actuator: &LoopbackActuator) -> Result<()> {
    // Request/reply
    let mode = runtime
        .motion_switcher()
        .get_mode()
        .await
        .context("GetMode failed")?;
    info!(name = ?mode.name, form = ?mode.form, "Motion mode");

    runtime
        .sport()
        .perform(SportMotion::StandUp, Ack::Wait)
        .await
        .context("StandUp failed")?;
    runtime
        .sport()
        .euler(5.0, 0.0, 0.0, AngleUnit::Degrees, Ack::FireAndForget)
        .await
        .context("Euler failed")?;

    if let Err(e) = runtime
        .sport()
        .perform(SportMotion::FrontFlip, Ack::Wait)
        .await
    {
        warn!(error = %e, "FrontFlip refused");
    }

    // Service-state stream
    runtime
        .robot_state()
        .subscribe_service_state()
        .context("Failed to subscribe to service state")?;
    actuator.publish_service_list(SERVICE_LIST).await?;
    for service in runtime.robot_state().services().iter() {
        info!(service = %service.name, running = service.running, "Service state");
    }

    // Sport-state stream
    let mut sport_rx = runtime
        .sport_state()
        .subscribe()
        .context("Failed to subscribe to sport state")?;
    let report = SportModeState {
        mode: 1,
        body_height: 0.32,
        ..SportModeState::default()
    };
    actuator
        .publish_sport_state(runtime.config().sport_state_rate.topic(), report)
        .await?;
    if tokio::time::timeout(Duration::from_millis(100), sport_rx.changed())
        .await
        .is_ok()
    {
        if let Some(state) = sport_rx.borrow().as_deref() {
            info!(mode = state.mode, body_height = state.body_height, "Sport state");
        }
    }

    // Low-level stream
    let low_level = runtime.low_level();
    low_level
        .subscribe_state()
        .context("Failed to subscribe to low-level state")?;
    let mut step: u32 = 0;
    low_level.start_streaming(move |cmd| {
        step = step.wrapping_add(1);
        let target = (step as f32 * 0.001).sin() * 0.1;
        for motor in cmd.motor_cmd.iter_mut().take(ACTIVE_JOINTS) {
            motor.mode = 0x01;
            motor.q = target;
            motor.kp = 20.0;
            motor.kd = 0.5;
        }
    })?;
    tokio::time::sleep(STREAM_DURATION).await;
    low_level.stop_streaming().await;

    if let Some(state) = low_level.latest_state() {
        info!(tick = state.tick, q0 = state.motor_state[0].q, "Latest verified state");
    }
    info!(stats = ?low_level.stats(), "Low-level channel");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let telemetry = TelemetryConfig::from_env();
    init_logging(&telemetry).context("Failed to initialize logging")?;

    // Load configuration
    let config = RuntimeConfig::from_env();
    let runtime = LinkRuntime::new(config).context("Invalid runtime configuration")?;
    let actuator = start_actuator(&runtime)?;

    info!("Actuator link running. Press Ctrl+C to stop.");
    tokio::select! {
        result = run_demo(&runtime, &actuator) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    // Graceful shutdown
    let report = runtime.shutdown().await;
    actuator.shutdown();
    info!(
        cancelled_calls = report.cancelled_calls,
        actuator = ?actuator.stats(),
        correlator = ?runtime.correlator().stats(),
        "Demo finished"
    );
    Ok(())
}
