//! Panel state machine behavior against scripted links

use parking_lot::Mutex;
use plotkit_core::{
    AppEvent, DeviceType, EventBus, JobType, MachineDimensions, PanelEvent, PanelMode,
};
use plotkit_devices::testing::ScriptedLink;
use plotkit_devices::{DeviceLink, DeviceLinkProvider, ListenerGuard, NoOpActuator};
use plotkit_engine::{EngineConfig, LinkPanelPort, TransmissionEngine};
use plotkit_panel::{EraseParams, PanelConfig, PanelStateMachine, PenDefinition};
use plotkit_queue::{JobQueue, QueueProcessor, QueueStore};
use std::sync::Arc;
use std::time::Duration;

struct DualProvider {
    motion: Mutex<Option<Arc<dyn DeviceLink>>>,
    panel: Mutex<Option<Arc<dyn DeviceLink>>>,
}

impl DualProvider {
    fn new(
        motion: Option<Arc<dyn DeviceLink>>,
        panel: Option<Arc<dyn DeviceLink>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            motion: Mutex::new(motion),
            panel: Mutex::new(panel),
        })
    }
}

impl DeviceLinkProvider for DualProvider {
    fn link(&self, device: DeviceType) -> Option<Arc<dyn DeviceLink>> {
        match device {
            DeviceType::Motion => self.motion.lock().clone(),
            DeviceType::Panel => self.panel.lock().clone(),
            DeviceType::Remote => None,
        }
    }
}

struct Rig {
    machine: Arc<PanelStateMachine>,
    queue: Arc<JobQueue>,
    bus: Arc<EventBus>,
    motion: Arc<ScriptedLink>,
    panel: Arc<ScriptedLink>,
    _dir: tempfile::TempDir,
}

fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(EventBus::new());
    let motion = ScriptedLink::acking(DeviceType::Motion);
    let panel = ScriptedLink::silent(DeviceType::Panel);
    let provider = DualProvider::new(Some(motion.clone()), Some(panel.clone()));

    let engine = Arc::new(TransmissionEngine::new(
        EngineConfig {
            ack_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_millis(5),
            max_consecutive_timeouts: 5,
            halt_on_error: false,
        },
        ListenerGuard::default(),
        Arc::new(NoOpActuator),
        Arc::new(LinkPanelPort::new(provider.clone())),
        bus.clone(),
    ));

    let queue = Arc::new(JobQueue::new(
        QueueStore::new(dir.path().join("queue.json")),
        bus.clone(),
    ));
    let processor = Arc::new(QueueProcessor::new(
        queue.clone(),
        engine.clone(),
        provider.clone(),
        bus.clone(),
    ));

    let config = PanelConfig {
        erase: EraseParams {
            dimensions: MachineDimensions {
                width_mm: 100.0,
                height_mm: 50.0,
            },
            row_spacing_mm: 25.0,
            feed: 6000,
            pen_down_angle: 90,
            pen_up_angle: 0,
        },
        pens: vec![PenDefinition {
            id: 1,
            name: "fine black".to_string(),
            motion_text: "G0 X50 Y0\nM2".to_string(),
        }],
        screenshot_exit_delay: Duration::from_millis(20),
        echo_window: Duration::from_secs(2),
    };

    let machine = Arc::new(PanelStateMachine::new(
        config,
        provider,
        engine,
        queue.clone(),
        processor,
        bus.clone(),
    ));

    Rig {
        machine,
        queue,
        bus,
        motion,
        panel,
        _dir: dir,
    }
}

#[tokio::test]
async fn draw_with_empty_queue_tells_panel_and_aborts() {
    let rig = rig();

    rig.machine
        .handle_line("DRAWING_BUTTON_PRESSED")
        .await
        .unwrap();

    assert_eq!(rig.panel.sent_lines(), vec!["queue_empty"]);
    assert_eq!(rig.machine.status().current_mode, PanelMode::QueueEmpty);
    // No transmission started.
    assert!(rig.motion.sent_lines().is_empty());
}

#[tokio::test]
async fn draw_button_drains_the_queue() {
    let rig = rig();
    rig.queue
        .enqueue(JobType::Text, "G21\nG90\nG0 X10 Y10\nM2")
        .await
        .unwrap();

    rig.machine
        .handle_line("DRAWING_BUTTON_PRESSED")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        rig.motion.sent_lines(),
        vec!["G21", "G90", "G0 X10 Y10", "M2"]
    );
    assert_eq!(rig.queue.len(), 0);
    // Panel was told to enter writing mode, then restored on completion.
    assert_eq!(rig.panel.sent_lines(), vec!["writing", "exit_writing"]);
}

#[tokio::test]
async fn login_messages_touch_only_status() {
    let rig = rig();

    rig.machine.handle_line("LOGIN_OK").await.unwrap();
    let status = rig.machine.status();
    assert!(status.logged_in);
    assert_eq!(status.current_mode, PanelMode::Ready);
    assert!(status.error.is_none());

    rig.machine.handle_line("LOGIN_FAIL").await.unwrap();
    assert!(rig.machine.status().error.is_some());

    rig.machine.handle_line("LOGOUT").await.unwrap();
    let status = rig.machine.status();
    assert!(!status.logged_in);
    assert_eq!(status.current_mode, PanelMode::Idle);

    rig.machine.handle_line("MaxAttemptAccessed").await.unwrap();
    assert_eq!(rig.machine.status().current_mode, PanelMode::Locked);

    // Status-only messages never write back to the panel.
    assert!(rig.panel.sent_lines().is_empty());
}

#[tokio::test]
async fn hardware_pen_trigger_streams_pen_sequence() {
    let rig = rig();

    rig.machine.handle_line("MODE_PEN1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(rig.motion.sent_lines(), vec!["G0 X50 Y0", "M2"]);
    let status = rig.machine.status();
    assert_eq!(status.current_pen, Some(1));
    // Engine restored the panel when the change finished.
    assert_eq!(rig.panel.sent_lines(), vec!["exit_pen1"]);
}

#[tokio::test]
async fn software_echo_does_not_retrigger() {
    let rig = rig();
    rig.queue.enqueue(JobType::Text, "G0 X1").await.unwrap();

    // The software layer put the panel into pen mode; the panel echoes it.
    rig.machine.send_mode_token("pen1").await.unwrap();
    rig.machine.handle_line("MODE_PEN1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rig.machine.status().current_mode, PanelMode::Pen1);
    // No direct transmission was invoked for the echo.
    assert!(rig.motion.sent_lines().is_empty());
    assert_eq!(rig.queue.len(), 1);
}

#[tokio::test]
async fn hardware_erase_trigger_streams_generated_sweep() {
    let rig = rig();

    rig.machine.handle_line("MODE_ERASING").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sent = rig.motion.sent_lines();
    assert_eq!(sent[0], "G21");
    assert_eq!(sent[1], "G90");
    assert!(sent.iter().any(|l| l == "G1 X100.000 Y0.000 F6000"));
    assert_eq!(sent.last().unwrap(), "M2");
    assert_eq!(rig.panel.sent_lines().last().unwrap(), "exit_erasing");
}

#[tokio::test]
async fn sync_request_answers_with_current_mode() {
    let rig = rig();

    rig.machine.handle_line("sync").await.unwrap();
    assert_eq!(rig.panel.sent_lines(), vec!["ready"]);

    rig.machine.handle_line("LOGIN_OK").await.unwrap();
    rig.machine.handle_line("MaxAttemptAccessed").await.unwrap();
    rig.machine.handle_line("sync").await.unwrap();
    assert_eq!(rig.panel.sent_lines(), vec!["ready", "locked"]);
}

#[tokio::test]
async fn screenshot_emits_event_and_auto_exits() {
    let rig = rig();
    let mut events = rig.bus.receiver();

    rig.machine.handle_line("SCREENSHOT_REQUEST").await.unwrap();
    assert_eq!(rig.machine.status().current_mode, PanelMode::Screenshot);

    let mut saw_request = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AppEvent::Panel(PanelEvent::ScreenshotRequested)) {
            saw_request = true;
        }
    }
    assert!(saw_request);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(rig.panel.sent_lines(), vec!["screenshot", "exit_screenshot"]);
    assert_eq!(rig.machine.status().current_mode, PanelMode::Ready);
}

#[tokio::test]
async fn unknown_pen_is_rejected_without_device_io() {
    let rig = rig();

    rig.machine.handle_line("MODE_PEN2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(rig.motion.sent_lines().is_empty());
    let status = rig.machine.status();
    assert!(status.error.as_deref().unwrap().contains("pen"));
}

#[tokio::test]
async fn unknown_tokens_are_recorded_but_inert() {
    let rig = rig();

    rig.machine.handle_line("BATTERY_LOW").await.unwrap();
    assert_eq!(
        rig.machine.status().last_message.as_deref(),
        Some("BATTERY_LOW")
    );
    assert!(rig.panel.sent_lines().is_empty());
    assert!(rig.motion.sent_lines().is_empty());
}
