//! Motion-command transmission engine
//!
//! Streams a command block line-by-line under the acknowledgement
//! protocol. A single advisory gate rejects concurrent transmissions
//! outright; within one transmission lines are strictly ordered, each
//! resolved by ack, tolerated firmware error, forced timeout advance,
//! or spurious-reset resynchronization. Pen-lift lines never reach the
//! device: they are routed to the local actuator and advanced after a
//! settling delay.
//!
//! Teardown is structural: the gate guard, the listener registration,
//! and the line subscription all release on drop, so caller-side
//! cancellation of the in-flight future cleans up without cooperation.

use crate::lines::{classify_response, scan_position, split_block, MotionLine, ResponseKind};
use crate::panel_port::PanelPort;
use parking_lot::RwLock;
use plotkit_core::{
    AppEvent, EngineError, EventBus, Position, Result, TransmissionEvent, TransmissionSummary,
    TransportError,
};
use plotkit_devices::{DeviceLink, ListenerGuard, LocalActuator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Listener guard event name for the acknowledgement stream
const ACK_EVENT: &str = "ack";

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-line acknowledgement timeout
    pub ack_timeout: Duration,
    /// Settling delay after an actuator move
    pub settle_delay: Duration,
    /// Consecutive timeouts at which the transmission aborts
    pub max_consecutive_timeouts: u32,
    /// Abort on firmware `error:` responses instead of continuing
    pub halt_on_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(250),
            max_consecutive_timeouts: 5,
            halt_on_error: false,
        }
    }
}

/// Panel context of a transmission, for mode restoration on exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Drawing a queued job
    Writing,
    /// Running the erase sweep
    Erasing,
    /// Changing to a numbered pen slot
    Pen(u8),
    /// Changing the eraser pen
    ErasingPen,
}

impl SendMode {
    /// Token that puts the panel into this mode
    pub fn enter_token(&self) -> String {
        match self {
            SendMode::Writing => "writing".to_string(),
            SendMode::Erasing => "erasing".to_string(),
            SendMode::Pen(n) => format!("pen{}", n),
            SendMode::ErasingPen => "erasing_pen".to_string(),
        }
    }

    /// Token that exits this mode back to ready
    pub fn exit_token(&self) -> String {
        format!("exit_{}", self.enter_token())
    }

    fn is_erase(&self) -> bool {
        matches!(self, SendMode::Erasing | SendMode::ErasingPen)
    }
}

enum AckOutcome {
    Acked,
    DeviceError(String),
    SpuriousReset,
    TimedOut,
    LinkClosed,
}

/// Single-flight motion-command transmission engine
pub struct TransmissionEngine {
    gate: tokio::sync::Mutex<()>,
    listeners: ListenerGuard,
    actuator: Arc<dyn LocalActuator>,
    panel: Arc<dyn PanelPort>,
    bus: Arc<EventBus>,
    config: EngineConfig,
    last_position: RwLock<Position>,
}

impl TransmissionEngine {
    /// Create an engine with the given collaborators
    pub fn new(
        config: EngineConfig,
        listeners: ListenerGuard,
        actuator: Arc<dyn LocalActuator>,
        panel: Arc<dyn PanelPort>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            listeners,
            actuator,
            panel,
            bus,
            config,
            last_position: RwLock::new(Position::default()),
        }
    }

    /// Last position scanned from transmitted lines; diagnostic only
    pub fn last_position(&self) -> Position {
        *self.last_position.read()
    }

    /// Stream one motion-command block through the given link
    ///
    /// Fails fast with [`EngineError::Busy`] while another transmission
    /// holds the gate. On completion or fatal abort the panel is
    /// restored to ready mode; the link itself stays open (it is owned
    /// by the connection manager, not by this call).
    pub async fn send(
        &self,
        motion_text: &str,
        link: Arc<dyn DeviceLink>,
        mode: SendMode,
    ) -> Result<TransmissionSummary> {
        let _gate = self.gate.try_lock().map_err(|_| EngineError::Busy)?;

        let result = self.stream(motion_text, &link).await;
        self.restore_panel(mode).await;

        match result {
            Ok(summary) => {
                tracing::info!(
                    "Transmission complete: {}/{} lines sent, {} intercepted",
                    summary.lines_sent,
                    summary.total_lines,
                    summary.lines_intercepted
                );
                self.bus
                    .publish(AppEvent::Transmission(TransmissionEvent::Completed {
                        summary,
                    }));
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Transmission failed: {}", e);
                self.bus
                    .publish(AppEvent::Transmission(TransmissionEvent::Failed {
                        reason: e.to_string(),
                    }));
                Err(e)
            }
        }
    }

    async fn stream(
        &self,
        motion_text: &str,
        link: &Arc<dyn DeviceLink>,
    ) -> Result<TransmissionSummary> {
        let lines = split_block(motion_text);
        let mut summary = TransmissionSummary {
            total_lines: lines.len(),
            ..Default::default()
        };

        if lines.is_empty() {
            return Ok(summary);
        }

        if !link.is_open() {
            return Err(EngineError::NotConnected {
                device: link.device_type(),
            }
            .into());
        }

        // Subscribe before the first write so no response can slip past,
        // and register with the guard so the subscription is accounted for.
        let _listener = self.listeners.register(link.device_type(), ACK_EVENT)?;
        let mut rx = link.subscribe_lines();

        let started = std::time::Instant::now();
        self.bus
            .publish(AppEvent::Transmission(TransmissionEvent::Started {
                total_lines: lines.len(),
            }));

        let mut position = *self.last_position.read();
        let mut consecutive_timeouts = 0u32;

        for (index, line) in lines.iter().enumerate() {
            match line {
                MotionLine::PenLift { angle } => {
                    self.actuator.set_angle(*angle).await?;
                    self.bus
                        .publish(AppEvent::Transmission(TransmissionEvent::ActuatorMoved {
                            angle: *angle,
                        }));
                    // Physical settling; the actuator never acknowledges.
                    tokio::time::sleep(self.config.settle_delay).await;
                    summary.lines_intercepted += 1;
                }
                MotionLine::Device(text) => {
                    link.write_line(text).await?;
                    scan_position(text, &mut position);

                    match self.await_ack(&mut rx).await {
                        AckOutcome::Acked => {
                            consecutive_timeouts = 0;
                            summary.lines_sent += 1;
                        }
                        AckOutcome::DeviceError(response) => {
                            if self.config.halt_on_error {
                                return Err(EngineError::FirmwareRejected {
                                    line: index,
                                    response,
                                }
                                .into());
                            }
                            tracing::warn!(
                                "Firmware rejected line {} ('{}'): {}; continuing",
                                index + 1,
                                text,
                                response
                            );
                            consecutive_timeouts = 0;
                            summary.protocol_errors += 1;
                            summary.lines_sent += 1;
                        }
                        AckOutcome::SpuriousReset => {
                            tracing::warn!(
                                "Controller reset mid-stream at line {}; resynchronizing",
                                index + 1
                            );
                            self.bus.publish(AppEvent::Transmission(
                                TransmissionEvent::SpuriousReset { line: index },
                            ));
                            consecutive_timeouts = 0;
                            summary.resets += 1;
                            summary.lines_sent += 1;
                        }
                        AckOutcome::TimedOut => {
                            consecutive_timeouts += 1;
                            summary.timeouts += 1;
                            self.bus.publish(AppEvent::Transmission(
                                TransmissionEvent::LineTimedOut { line: index },
                            ));
                            if consecutive_timeouts >= self.config.max_consecutive_timeouts {
                                return Err(EngineError::DeviceUnresponsive {
                                    timeouts: consecutive_timeouts,
                                }
                                .into());
                            }
                            tracing::warn!(
                                "No acknowledgement for line {} within {:?}; forcing advance",
                                index + 1,
                                self.config.ack_timeout
                            );
                            summary.lines_sent += 1;
                        }
                        AckOutcome::LinkClosed => {
                            return Err(TransportError::ConnectionLost {
                                device: link.device_type(),
                                reason: "link closed while awaiting acknowledgement".to_string(),
                            }
                            .into());
                        }
                    }
                }
            }

            self.bus
                .publish(AppEvent::Transmission(TransmissionEvent::Progress {
                    line: index,
                    total: lines.len(),
                }));
        }

        *self.last_position.write() = position;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Wait for the response that resolves the line in flight
    ///
    /// Garbled bytes and unsolicited chatter are dropped without
    /// advancing; the deadline covers the whole wait, not each message.
    async fn await_ack(&self, rx: &mut broadcast::Receiver<String>) -> AckOutcome {
        let deadline = tokio::time::Instant::now() + self.config.ack_timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return AckOutcome::TimedOut,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!("Ack listener lagged {} lines", skipped);
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return AckOutcome::LinkClosed,
                Ok(Ok(response)) => match classify_response(&response) {
                    ResponseKind::Ack => return AckOutcome::Acked,
                    ResponseKind::DeviceError(detail) => return AckOutcome::DeviceError(detail),
                    ResponseKind::BootBanner => return AckOutcome::SpuriousReset,
                    ResponseKind::Garbage => {
                        tracing::debug!("Dropping garbled response");
                        continue;
                    }
                    ResponseKind::Other(line) => {
                        tracing::debug!("Unsolicited controller message: {}", line);
                        continue;
                    }
                },
            }
        }
    }

    /// Put the panel back into ready mode after a transmission
    async fn restore_panel(&self, mode: SendMode) {
        // The eraser needs to physically lift before the panel flips modes.
        if mode.is_erase() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        if let Err(e) = self.panel.write_token(&mode.exit_token()).await {
            tracing::warn!("Failed to restore panel after transmission: {}", e);
        }
    }
}
