//! Transmission engine behavior against scripted devices

use async_trait::async_trait;
use parking_lot::Mutex;
use plotkit_core::{EventBus, Position, Result};
use plotkit_core::DeviceType;
use plotkit_devices::testing::{RecordingActuator, ScriptedLink};
use plotkit_devices::{ListenerGuard, LocalActuator};
use plotkit_engine::{EngineConfig, PanelPort, SendMode, TransmissionEngine};
use std::sync::Arc;
use std::time::Duration;

struct RecordingPanelPort {
    tokens: Mutex<Vec<String>>,
}

impl RecordingPanelPort {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(Vec::new()),
        })
    }

    fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }
}

#[async_trait]
impl PanelPort for RecordingPanelPort {
    async fn write_token(&self, token: &str) -> Result<()> {
        self.tokens.lock().push(token.to_string());
        Ok(())
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        ack_timeout: Duration::from_millis(40),
        settle_delay: Duration::from_millis(5),
        max_consecutive_timeouts: 5,
        halt_on_error: false,
    }
}

struct Rig {
    engine: Arc<TransmissionEngine>,
    actuator: Arc<RecordingActuator>,
    panel: Arc<RecordingPanelPort>,
    guard: ListenerGuard,
}

fn rig_with(config: EngineConfig) -> Rig {
    let guard = ListenerGuard::default();
    let actuator = Arc::new(RecordingActuator::new());
    let panel = RecordingPanelPort::new();
    let engine = Arc::new(TransmissionEngine::new(
        config,
        guard.clone(),
        actuator.clone() as Arc<dyn LocalActuator>,
        panel.clone(),
        Arc::new(EventBus::new()),
    ));
    Rig {
        engine,
        actuator,
        panel,
        guard,
    }
}

fn rig() -> Rig {
    rig_with(fast_config())
}

#[tokio::test]
async fn streams_block_in_order_with_acks() {
    let rig = rig();
    let link = ScriptedLink::acking(DeviceType::Motion);

    let summary = rig
        .engine
        .send("G21\nG90\nG0 X10 Y10\nM2", link.clone(), SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(summary.total_lines, 4);
    assert_eq!(summary.lines_sent, 4);
    assert_eq!(summary.lines_intercepted, 0);
    assert_eq!(summary.timeouts, 0);
    assert_eq!(link.sent_lines(), vec!["G21", "G90", "G0 X10 Y10", "M2"]);
    assert_eq!(rig.engine.last_position(), Position::new(10.0, 10.0, 0.0));
    assert_eq!(rig.panel.tokens(), vec!["exit_writing"]);
}

#[tokio::test]
async fn second_transmission_fails_fast_with_busy() {
    let rig = rig_with(EngineConfig {
        ack_timeout: Duration::from_secs(5),
        ..fast_config()
    });
    let slow_link = ScriptedLink::silent(DeviceType::Motion);

    let engine = rig.engine.clone();
    let holder = tokio::spawn(async move {
        let _ = engine.send("G0 X1\nG0 X2", slow_link, SendMode::Writing).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let link = ScriptedLink::acking(DeviceType::Motion);
    let err = rig
        .engine
        .send("G0 X3", link.clone(), SendMode::Writing)
        .await
        .unwrap_err();

    assert!(err.is_busy());
    // The rejected attempt never touched the device.
    assert!(link.sent_lines().is_empty());

    holder.abort();
}

#[tokio::test]
async fn pen_lift_is_intercepted_not_written() {
    let rig = rig();
    let link = ScriptedLink::acking(DeviceType::Motion);

    let summary = rig
        .engine
        .send("G21\nM3 S90\nG0 X5 Y5\nM2", link.clone(), SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(summary.lines_intercepted, 1);
    assert_eq!(summary.lines_sent, 3);
    assert_eq!(rig.actuator.angles(), vec![90]);
    assert_eq!(link.sent_lines(), vec!["G21", "G0 X5 Y5", "M2"]);
}

#[tokio::test]
async fn pen_lift_parameter_is_clamped() {
    let rig = rig();
    let link = ScriptedLink::acking(DeviceType::Motion);

    rig.engine
        .send("M3 S500\nM3 S-10", link, SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(rig.actuator.angles(), vec![180, 0]);
}

#[tokio::test]
async fn firmware_error_is_logged_and_advances() {
    let rig = rig();
    let link = ScriptedLink::with_script(
        DeviceType::Motion,
        &[&["ok"], &["error:20 Unsupported command"]],
    );

    let summary = rig
        .engine
        .send("G21\nG5.3 X1\nM2", link.clone(), SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(summary.lines_sent, 3);
    assert_eq!(summary.protocol_errors, 1);
    assert_eq!(link.sent_lines().len(), 3);
}

#[tokio::test]
async fn halt_on_error_policy_aborts() {
    let rig = rig_with(EngineConfig {
        halt_on_error: true,
        ..fast_config()
    });
    let link = ScriptedLink::with_script(DeviceType::Motion, &[&["error:2"]]);

    let err = rig
        .engine
        .send("G21\nG90", link.clone(), SendMode::Writing)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("rejected"));
    assert_eq!(link.sent_lines(), vec!["G21"]);
    // Panel restoration still runs on the abort path.
    assert_eq!(rig.panel.tokens(), vec!["exit_writing"]);
}

#[tokio::test]
async fn garbled_responses_drop_without_advancing() {
    let rig = rig();
    let link = ScriptedLink::with_script(DeviceType::Motion, &[&["\u{FFFD}\u{FFFD}\u{FFFD}", "ok"]]);

    let summary = rig
        .engine
        .send("G0 X1", link, SendMode::Writing)
        .await
        .unwrap();

    // The garbage neither advanced the cursor nor counted as a timeout.
    assert_eq!(summary.lines_sent, 1);
    assert_eq!(summary.timeouts, 0);
}

#[tokio::test]
async fn timeout_force_advances_then_recovers() {
    let rig = rig();
    let link = ScriptedLink::with_script::<&str>(DeviceType::Motion, &[&[]]);

    let summary = rig
        .engine
        .send("G0 X1\nG0 X2\nG0 X3", link.clone(), SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(summary.timeouts, 1);
    assert_eq!(summary.lines_sent, 3);
    assert_eq!(link.sent_lines().len(), 3);
}

#[tokio::test]
async fn five_consecutive_timeouts_abort_as_unresponsive() {
    let rig = rig();
    let link = ScriptedLink::silent(DeviceType::Motion);

    let err = rig
        .engine
        .send(
            "G0 X1\nG0 X2\nG0 X3\nG0 X4\nG0 X5\nG0 X6\nG0 X7",
            link.clone(),
            SendMode::Erasing,
        )
        .await
        .unwrap_err();

    assert!(err.is_unresponsive());
    // The fifth consecutive timeout aborts; the remaining lines are never written.
    assert_eq!(link.sent_lines().len(), 5);
    // The panel mode-exit command is still sent on the fatal path.
    assert_eq!(rig.panel.tokens(), vec!["exit_erasing"]);
}

#[tokio::test]
async fn boot_banner_mid_stream_resynchronizes() {
    let rig = rig();
    let link = ScriptedLink::with_script(
        DeviceType::Motion,
        &[&["ok"], &["Grbl 1.1h ['$' for help]"]],
    );

    let summary = rig
        .engine
        .send("G21\nG90\nM2", link, SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(summary.resets, 1);
    assert_eq!(summary.lines_sent, 3);
}

#[tokio::test]
async fn empty_block_completes_without_device_io() {
    let rig = rig();
    let link = ScriptedLink::acking(DeviceType::Motion);

    let summary = rig
        .engine
        .send("; comment only\n\n(another comment)", link.clone(), SendMode::Writing)
        .await
        .unwrap();

    assert_eq!(summary.total_lines, 0);
    assert!(link.sent_lines().is_empty());
}

#[tokio::test]
async fn cancellation_releases_gate_and_listener() {
    let rig = rig_with(EngineConfig {
        ack_timeout: Duration::from_secs(5),
        ..fast_config()
    });
    let stuck_link = ScriptedLink::silent(DeviceType::Motion);

    let engine = rig.engine.clone();
    let in_flight = tokio::spawn(async move {
        let _ = engine
            .send("G0 X1\nG0 X2", stuck_link, SendMode::Writing)
            .await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(rig.guard.active_count(DeviceType::Motion, "ack"), 1);

    // Caller-side cancellation: drop the in-flight future.
    in_flight.abort();
    let _ = in_flight.await;

    // Listener registration and gate are both released.
    assert_eq!(rig.guard.active_count(DeviceType::Motion, "ack"), 0);
    let link = ScriptedLink::acking(DeviceType::Motion);
    let summary = rig
        .engine
        .send("G0 X9", link, SendMode::Writing)
        .await
        .unwrap();
    assert_eq!(summary.lines_sent, 1);
}
