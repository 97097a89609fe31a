//! Error handling for Plotkit
//!
//! Provides error types for every layer of the control plane:
//! - Transport errors (link open/write/close failures)
//! - Engine errors (contention, liveness, cancellation)
//! - Queue errors (ordering, persistence)
//! - Configuration errors (rejected at the boundary, before device I/O)
//!
//! All error types use `thiserror` for ergonomic error handling.
//! Firmware `error:` lines and corrupted response bytes are deliberately
//! absent here: they are logged and tolerated inside the transmission
//! engine, never surfaced as `Err` values.

use crate::data::DeviceType;
use thiserror::Error;

/// Transport error type
///
/// Failures of the physical link itself. Retried with backoff by the
/// Connection Manager; fatal to the current operation at the engine level.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Port could not be found on the system
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The port that was not found.
        port: String,
    },

    /// Port exists but could not be opened
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Write to an open link failed
    #[error("Write failed on {device} link: {reason}")]
    WriteFailed {
        /// The device whose link failed.
        device: DeviceType,
        /// The reason the write failed.
        reason: String,
    },

    /// The link closed underneath an operation
    #[error("Connection lost on {device} link: {reason}")]
    ConnectionLost {
        /// The device whose link was lost.
        device: DeviceType,
        /// The reason the connection was lost.
        reason: String,
    },

    /// Port enumeration failed
    #[error("Failed to enumerate ports: {reason}")]
    EnumerationFailed {
        /// The reason enumeration failed.
        reason: String,
    },

    /// Generic transport error
    #[error("Transport error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Transmission engine error type
///
/// Errors that abort a transmission or reject it before it starts.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A transmission is already in flight; concurrent attempts are
    /// rejected, never queued
    #[error("Transmission already in progress")]
    Busy,

    /// No open link for the required device
    #[error("Device not connected: {device}")]
    NotConnected {
        /// The device that has no open link.
        device: DeviceType,
    },

    /// Consecutive ack timeouts exceeded the liveness ceiling
    #[error("Device unresponsive after {timeouts} consecutive timeouts")]
    DeviceUnresponsive {
        /// The number of consecutive timeouts observed.
        timeouts: u32,
    },

    /// Firmware rejected a line and the halt-on-error policy is active
    #[error("Firmware rejected line {line}: {response}")]
    FirmwareRejected {
        /// Zero-based index of the rejected line.
        line: usize,
        /// The firmware error response.
        response: String,
    },

    /// Generic engine error
    #[error("Engine error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Job queue error type
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Index-based mutation outside the queue bounds
    #[error("Index {index} out of range for queue of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The queue length at the time of the request.
        len: usize,
    },

    /// Job id not present in the queue
    #[error("Job not found: {id}")]
    JobNotFound {
        /// The job id that was not found.
        id: String,
    },

    /// Attempted to reorder or remove a job that is streaming
    #[error("Job {id} is processing and cannot be mutated")]
    JobProcessing {
        /// The id of the in-flight job.
        id: String,
    },

    /// Durable queue write failed
    #[error("Failed to persist queue: {reason}")]
    PersistFailed {
        /// The reason persistence failed.
        reason: String,
    },

    /// The processor loop is already running
    #[error("Queue processor already running")]
    ProcessorBusy,
}

/// Configuration error type
///
/// Rejected at the boundary before any device interaction.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Device type was never registered
    #[error("Unknown device: {device}")]
    UnknownDevice {
        /// The unregistered device type.
        device: DeviceType,
    },

    /// Pen id has no configured motion text
    #[error("Unknown pen: {id}")]
    UnknownPen {
        /// The pen id with no configuration.
        id: u8,
    },

    /// Subscriber cap for a listener event was reached
    #[error("Listener limit reached for {device}/{event}: {limit}")]
    ListenerLimit {
        /// The device whose stream is saturated.
        device: DeviceType,
        /// The event name.
        event: String,
        /// The configured cap.
        limit: usize,
    },

    /// A configuration field holds an out-of-range value
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A required configuration field is missing
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field.
        field: String,
    },

    /// Shared-secret authorization failed
    #[error("Not authorized")]
    NotAuthorized,
}

/// Main error type for Plotkit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Queue error
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a contention rejection
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Error::Engine(EngineError::Busy) | Error::Queue(QueueError::ProcessorBusy)
        )
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a liveness failure
    pub fn is_unresponsive(&self) -> bool {
        matches!(self, Error::Engine(EngineError::DeviceUnresponsive { .. }))
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
