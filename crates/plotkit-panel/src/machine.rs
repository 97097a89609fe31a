//! Operator panel state machine
//!
//! Consumes one panel line at a time, updates the panel status record,
//! and performs at most one side effect per message: telling the panel
//! to change mode, kicking the queue processor, or starting a direct
//! transmission for a pen change or erase sweep.
//!
//! Mode messages are ambiguous in the panel protocol: the panel echoes
//! the mode tokens we write to it with the same uppercase messages an
//! operator action produces. A trailing window against the last
//! software-issued token disambiguates; see the design notes for why
//! this is inherently racy.

use crate::protocol::{parse_line, tokens, PanelMessage};
use crate::sweep::{erase_sweep, EraseParams};
use parking_lot::{Mutex, RwLock};
use plotkit_core::{
    AppEvent, ConfigError, DeviceType, ErrorEvent, EventBus, PanelEvent, PanelMode, PanelStatus,
    Result,
};
use plotkit_devices::DeviceLinkProvider;
use plotkit_engine::{SendMode, TransmissionEngine};
use plotkit_queue::{JobQueue, QueueProcessor};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

/// Pen id reserved for the eraser pen
pub const ERASER_PEN_ID: u8 = 0;

/// One preconfigured pen-change sequence
#[derive(Debug, Clone)]
pub struct PenDefinition {
    /// Pen slot id; [`ERASER_PEN_ID`] is the eraser
    pub id: u8,
    /// Display name
    pub name: String,
    /// Motion text streamed when this pen is selected
    pub motion_text: String,
}

/// Panel state machine configuration
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Erase sweep parameters
    pub erase: EraseParams,
    /// Preconfigured pens, looked up by id
    pub pens: Vec<PenDefinition>,
    /// Delay before screenshot mode auto-exits
    pub screenshot_exit_delay: Duration,
    /// Trailing window for software-echo disambiguation
    pub echo_window: Duration,
}

impl PanelConfig {
    fn pen(&self, id: u8) -> Result<&PenDefinition> {
        self.pens
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ConfigError::UnknownPen { id }.into())
    }
}

/// Panel state machine
pub struct PanelStateMachine {
    status: RwLock<PanelStatus>,
    provider: Arc<dyn DeviceLinkProvider>,
    engine: Arc<TransmissionEngine>,
    queue: Arc<JobQueue>,
    processor: Arc<QueueProcessor>,
    bus: Arc<EventBus>,
    config: PanelConfig,
    last_software_token: Mutex<Option<(String, Instant)>>,
}

impl PanelStateMachine {
    /// Create a state machine with the given collaborators
    pub fn new(
        config: PanelConfig,
        provider: Arc<dyn DeviceLinkProvider>,
        engine: Arc<TransmissionEngine>,
        queue: Arc<JobQueue>,
        processor: Arc<QueueProcessor>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            status: RwLock::new(PanelStatus::default()),
            provider,
            engine,
            queue,
            processor,
            bus,
            config,
            last_software_token: Mutex::new(None),
        }
    }

    /// Snapshot of the current panel status
    pub fn status(&self) -> PanelStatus {
        self.status.read().clone()
    }

    /// Record panel link state; a drop counts a reconnect attempt
    pub fn set_connected(&self, connected: bool) {
        {
            let mut status = self.status.write();
            if status.connected && !connected {
                status.reconnect_attempts += 1;
            }
            status.connected = connected;
        }
        self.broadcast_status();
    }

    /// Write a mode token on behalf of the software layer
    ///
    /// Records the token so the panel's echo of it is not mistaken for
    /// an operator action.
    pub async fn send_mode_token(&self, token: &str) -> Result<()> {
        *self.last_software_token.lock() = Some((token.to_string(), Instant::now()));
        self.write_token(token).await
    }

    /// Consume one panel line
    pub async fn handle_line(self: &Arc<Self>, line: &str) -> Result<()> {
        let Some(message) = parse_line(line) else {
            return Ok(());
        };

        tracing::debug!("Panel message: {:?}", message);
        self.status.write().last_message = Some(line.trim().to_string());

        match message {
            PanelMessage::Idle => self.set_mode(PanelMode::Idle),
            PanelMessage::LoginOk => {
                let mut status = self.status.write();
                status.logged_in = true;
                status.error = None;
                status.current_mode = PanelMode::Ready;
                drop(status);
                self.broadcast_status();
            }
            PanelMessage::LoginFail => {
                self.status.write().error = Some("login failed".to_string());
                self.broadcast_status();
            }
            PanelMessage::Logout => {
                let mut status = self.status.write();
                status.logged_in = false;
                status.current_mode = PanelMode::Idle;
                drop(status);
                self.broadcast_status();
            }
            PanelMessage::MaxAttemptsReached => self.set_mode(PanelMode::Locked),
            PanelMessage::ModeReady => self.set_mode(PanelMode::Ready),
            PanelMessage::ModeWriting => {
                if self.is_software_echo(&message) {
                    self.set_mode(PanelMode::Writing);
                } else {
                    self.trigger_draw().await?;
                }
            }
            PanelMessage::ModeErasing => {
                if self.is_software_echo(&message) {
                    self.set_mode(PanelMode::Erasing);
                } else {
                    self.trigger_erase().await?;
                }
            }
            PanelMessage::ModePen1 => {
                if self.is_software_echo(&message) {
                    self.set_mode(PanelMode::Pen1);
                } else {
                    self.trigger_pen(1, PanelMode::Pen1, SendMode::Pen(1)).await?;
                }
            }
            PanelMessage::ModePen2 => {
                if self.is_software_echo(&message) {
                    self.set_mode(PanelMode::Pen2);
                } else {
                    self.trigger_pen(2, PanelMode::Pen2, SendMode::Pen(2)).await?;
                }
            }
            PanelMessage::ModeErasingPen => {
                if self.is_software_echo(&message) {
                    self.set_mode(PanelMode::ErasingPen);
                } else {
                    self.trigger_pen(ERASER_PEN_ID, PanelMode::ErasingPen, SendMode::ErasingPen)
                        .await?;
                }
            }
            PanelMessage::DrawingButtonPressed => self.trigger_draw().await?,
            PanelMessage::ScreenshotRequest => self.trigger_screenshot().await?,
            PanelMessage::Sync => {
                let token = self.current_mode_token();
                self.write_token(&token).await?;
                self.broadcast_status();
            }
            PanelMessage::Unknown(token) => {
                tracing::debug!("Ignoring unknown panel token: {}", token);
                self.broadcast_status();
            }
        }

        Ok(())
    }

    /// Read panel lines until the link drops, reconnecting as links return
    pub async fn run(self: Arc<Self>) {
        loop {
            let Some(link) = self.provider.link(DeviceType::Panel) else {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            };

            self.set_connected(true);
            let mut rx = link.subscribe_lines();
            loop {
                match rx.recv().await {
                    Ok(line) => {
                        if let Err(e) = self.handle_line(&line).await {
                            tracing::warn!("Panel message handling failed: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Panel reader lagged {} lines", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            self.set_connected(false);
        }
    }

    fn set_mode(&self, mode: PanelMode) {
        self.status.write().current_mode = mode;
        self.broadcast_status();
    }

    fn broadcast_status(&self) {
        let status = self.status();
        self.bus
            .publish(AppEvent::Panel(PanelEvent::StatusChanged { status }));
    }

    /// Whether a mode message is the echo of a recent software token
    fn is_software_echo(&self, message: &PanelMessage) -> bool {
        let Some(expected) = message.echo_of() else {
            return false;
        };
        let last = self.last_software_token.lock();
        match last.as_ref() {
            Some((token, at)) => token == expected && at.elapsed() <= self.config.echo_window,
            None => false,
        }
    }

    fn current_mode_token(&self) -> String {
        let status = self.status.read();
        if !status.logged_in {
            return tokens::READY.to_string();
        }
        match status.current_mode {
            PanelMode::Writing => tokens::WRITING.to_string(),
            PanelMode::Erasing => tokens::ERASING.to_string(),
            PanelMode::Pen1 => tokens::PEN1.to_string(),
            PanelMode::Pen2 => tokens::PEN2.to_string(),
            PanelMode::ErasingPen => tokens::ERASING_PEN.to_string(),
            PanelMode::Screenshot => tokens::SCREENSHOT.to_string(),
            PanelMode::Locked => tokens::LOCKED.to_string(),
            _ => tokens::READY.to_string(),
        }
    }

    async fn write_token(&self, token: &str) -> Result<()> {
        match self.provider.link(DeviceType::Panel) {
            Some(link) => link.write_line(token).await,
            None => {
                tracing::debug!("Panel token '{}' skipped: panel not connected", token);
                Ok(())
            }
        }
    }

    /// Hardware draw trigger: start queue processing, or report an empty queue
    async fn trigger_draw(self: &Arc<Self>) -> Result<()> {
        if self.queue.pending_count() == 0 {
            tracing::info!("Draw requested with an empty queue");
            self.write_token(tokens::QUEUE_EMPTY).await?;
            self.set_mode(PanelMode::QueueEmpty);
            return Ok(());
        }

        self.send_mode_token(tokens::WRITING).await?;
        self.set_mode(PanelMode::Writing);

        let machine = self.clone();
        tokio::spawn(async move {
            match machine.processor.start_processing().await {
                Ok(report) => {
                    tracing::info!(
                        "Draw finished: {} completed, {} failed",
                        report.completed,
                        report.failed
                    );
                }
                Err(e) => {
                    tracing::error!("Draw processing failed: {}", e);
                    machine.bus.publish(AppEvent::Error(ErrorEvent::Internal {
                        message: format!("processing failed: {}", e),
                    }));
                }
            }
        });
        Ok(())
    }

    /// Hardware erase trigger: stream the generated sweep directly
    async fn trigger_erase(self: &Arc<Self>) -> Result<()> {
        let Some(link) = self.provider.link(DeviceType::Motion) else {
            self.report_device_error("erase skipped: motion controller not connected");
            return Ok(());
        };

        self.set_mode(PanelMode::Erasing);
        let text = erase_sweep(&self.config.erase);
        self.spawn_direct(text, link, SendMode::Erasing);
        Ok(())
    }

    /// Pen-change trigger: stream the pen's preconfigured motion text
    async fn trigger_pen(
        self: &Arc<Self>,
        pen_id: u8,
        mode: PanelMode,
        send_mode: SendMode,
    ) -> Result<()> {
        let pen = match self.config.pen(pen_id) {
            Ok(pen) => pen.clone(),
            Err(e) => {
                self.report_device_error(&format!("pen change rejected: {}", e));
                return Ok(());
            }
        };

        let Some(link) = self.provider.link(DeviceType::Motion) else {
            self.report_device_error(&format!(
                "pen change '{}' skipped: motion controller not connected",
                pen.name
            ));
            return Ok(());
        };

        {
            let mut status = self.status.write();
            status.current_mode = mode;
            status.current_pen = Some(pen_id);
        }
        self.broadcast_status();
        self.spawn_direct(pen.motion_text, link, send_mode);
        Ok(())
    }

    /// Screenshot trigger: hand off to the camera collaborator, auto-exit later
    async fn trigger_screenshot(self: &Arc<Self>) -> Result<()> {
        self.write_token(tokens::SCREENSHOT).await?;
        self.set_mode(PanelMode::Screenshot);
        self.bus
            .publish(AppEvent::Panel(PanelEvent::ScreenshotRequested));

        let machine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(machine.config.screenshot_exit_delay).await;
            if let Err(e) = machine.write_token(tokens::EXIT_SCREENSHOT).await {
                tracing::warn!("Screenshot auto-exit failed: {}", e);
            }
            let mut status = machine.status.write();
            if status.current_mode == PanelMode::Screenshot {
                status.current_mode = PanelMode::Ready;
                drop(status);
                machine.broadcast_status();
            }
        });
        Ok(())
    }

    fn spawn_direct(
        self: &Arc<Self>,
        text: String,
        link: Arc<dyn plotkit_devices::DeviceLink>,
        mode: SendMode,
    ) {
        let machine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = machine.engine.send(&text, link, mode).await {
                if e.is_busy() {
                    tracing::warn!("Direct transmission rejected: engine busy");
                } else {
                    tracing::error!("Direct transmission failed: {}", e);
                }
                machine.bus.publish(AppEvent::Error(ErrorEvent::Device {
                    device: DeviceType::Motion,
                    message: e.to_string(),
                }));
            }
        });
    }

    fn report_device_error(&self, message: &str) {
        tracing::warn!("{}", message);
        self.status.write().error = Some(message.to_string());
        self.broadcast_status();
        self.bus.publish(AppEvent::Error(ErrorEvent::Device {
            device: DeviceType::Motion,
            message: message.to_string(),
        }));
    }
}
