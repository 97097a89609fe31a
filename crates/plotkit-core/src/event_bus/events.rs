//! Event type definitions for the event bus.
//!
//! This module defines all control-plane events organized by category.
//! Events are designed to be cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};

use crate::data::{DeviceType, MotionJob, PanelStatus, TransmissionSummary};

/// Root event enum for all control-plane events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// Device connection lifecycle
    Connection(ConnectionEvent),
    /// Motion-command transmission progress
    Transmission(TransmissionEvent),
    /// Job queue mutation and processing
    Queue(QueueEvent),
    /// Panel status and hardware triggers
    Panel(PanelEvent),
    /// Error and diagnostic events
    Error(ErrorEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Connection(_) => EventCategory::Connection,
            AppEvent::Transmission(_) => EventCategory::Transmission,
            AppEvent::Queue(_) => EventCategory::Queue,
            AppEvent::Panel(_) => EventCategory::Panel,
            AppEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for the activity log
    pub fn description(&self) -> String {
        match self {
            AppEvent::Connection(e) => e.description(),
            AppEvent::Transmission(e) => e.description(),
            AppEvent::Queue(e) => e.description(),
            AppEvent::Panel(e) => e.description(),
            AppEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Device connection lifecycle
    Connection,
    /// Transmission progress and faults
    Transmission,
    /// Queue mutation and processing
    Queue,
    /// Panel status and triggers
    Panel,
    /// Errors surfaced outward
    Error,
}

/// Device connection lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// A link opened successfully
    Connected {
        /// The device that connected.
        device: DeviceType,
        /// The port the link opened on.
        port: String,
    },
    /// A link dropped
    Disconnected {
        /// The device that disconnected.
        device: DeviceType,
        /// Why the link dropped.
        reason: String,
    },
    /// A connect attempt failed
    AttemptFailed {
        /// The device whose attempt failed.
        device: DeviceType,
        /// The failure message.
        reason: String,
    },
    /// A retry was scheduled with backoff
    RetryScheduled {
        /// The device the retry is for.
        device: DeviceType,
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// Delay until the retry fires, in milliseconds.
        delay_ms: u64,
    },
}

impl ConnectionEvent {
    /// Short description for the activity log
    pub fn description(&self) -> String {
        match self {
            Self::Connected { device, port } => format!("{} connected on {}", device, port),
            Self::Disconnected { device, reason } => {
                format!("{} disconnected: {}", device, reason)
            }
            Self::AttemptFailed { device, reason } => {
                format!("{} connect failed: {}", device, reason)
            }
            Self::RetryScheduled {
                device,
                attempt,
                delay_ms,
            } => format!("{} retry #{} in {}ms", device, attempt, delay_ms),
        }
    }
}

/// Transmission progress and fault events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransmissionEvent {
    /// A transmission acquired the gate and started
    Started {
        /// Streamable lines in the block.
        total_lines: usize,
    },
    /// The cursor advanced past a line
    Progress {
        /// Zero-based index of the resolved line.
        line: usize,
        /// Total streamable lines.
        total: usize,
    },
    /// The actuator handled an intercepted line
    ActuatorMoved {
        /// The clamped target angle.
        angle: u8,
    },
    /// A line timed out waiting for acknowledgement and was force-advanced
    LineTimedOut {
        /// Zero-based index of the timed-out line.
        line: usize,
    },
    /// The firmware boot banner reappeared mid-stream
    SpuriousReset {
        /// Zero-based index of the line in flight when the banner arrived.
        line: usize,
    },
    /// The transmission ran to the end of the block
    Completed {
        /// Outcome counters.
        summary: TransmissionSummary,
    },
    /// The transmission aborted
    Failed {
        /// The abort reason.
        reason: String,
    },
}

impl TransmissionEvent {
    /// Short description for the activity log
    pub fn description(&self) -> String {
        match self {
            Self::Started { total_lines } => format!("transmission started ({} lines)", total_lines),
            Self::Progress { line, total } => format!("line {}/{}", line + 1, total),
            Self::ActuatorMoved { angle } => format!("pen lift to {}°", angle),
            Self::LineTimedOut { line } => format!("ack timeout on line {}", line + 1),
            Self::SpuriousReset { line } => format!("spurious reset at line {}", line + 1),
            Self::Completed { summary } => format!(
                "transmission complete: {} sent, {} intercepted",
                summary.lines_sent, summary.lines_intercepted
            ),
            Self::Failed { reason } => format!("transmission failed: {}", reason),
        }
    }
}

/// Queue mutation and processing events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A job was enqueued
    JobAdded {
        /// Snapshot of the new job.
        job: Box<MotionJob>,
    },
    /// A job left the queue (completed or explicitly removed)
    JobRemoved {
        /// Id of the removed job.
        id: String,
    },
    /// A job was reordered
    JobMoved {
        /// Original index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// A job changed lifecycle status
    JobStatusChanged {
        /// Id of the job.
        id: String,
        /// Status after the change, as its wire name.
        status: String,
    },
    /// The queue was emptied
    Cleared,
    /// The processor loop started
    ProcessingStarted,
    /// The processor loop drained the queue
    ProcessingFinished {
        /// Jobs completed and removed.
        completed: usize,
        /// Jobs failed and retained.
        failed: usize,
    },
}

impl QueueEvent {
    /// Short description for the activity log
    pub fn description(&self) -> String {
        match self {
            Self::JobAdded { job } => format!("job {} queued ({})", job.id, job.job_type),
            Self::JobRemoved { id } => format!("job {} removed", id),
            Self::JobMoved { from, to } => format!("job moved {} -> {}", from, to),
            Self::JobStatusChanged { id, status } => format!("job {} -> {}", id, status),
            Self::Cleared => "queue cleared".to_string(),
            Self::ProcessingStarted => "processing started".to_string(),
            Self::ProcessingFinished { completed, failed } => {
                format!("processing finished: {} completed, {} failed", completed, failed)
            }
        }
    }
}

/// Panel status and hardware trigger events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PanelEvent {
    /// The panel status record mutated
    StatusChanged {
        /// Snapshot after the mutation.
        status: PanelStatus,
    },
    /// The operator requested a camera capture
    ScreenshotRequested,
}

impl PanelEvent {
    /// Short description for the activity log
    pub fn description(&self) -> String {
        match self {
            Self::StatusChanged { status } => format!("panel mode {}", status.current_mode),
            Self::ScreenshotRequested => "screenshot requested".to_string(),
        }
    }
}

/// Errors broadcast outward for the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ErrorEvent {
    /// A device-scoped error
    Device {
        /// The device the error relates to.
        device: DeviceType,
        /// The error message.
        message: String,
    },
    /// An internal error not tied to one device
    Internal {
        /// The error message.
        message: String,
    },
}

impl ErrorEvent {
    /// Short description for the activity log
    pub fn description(&self) -> String {
        match self {
            Self::Device { device, message } => format!("{} error: {}", device, message),
            Self::Internal { message } => format!("error: {}", message),
        }
    }
}
