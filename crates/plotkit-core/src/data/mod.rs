//! Data models for devices, jobs, and panel state
//!
//! This module provides:
//! - Device type identifiers and per-type connection state
//! - Last-known-position tracking (diagnostic, not authoritative)
//! - Motion job records and their lifecycle status
//! - Panel status and mode representation
//! - Transmission summaries attached to completed jobs

pub mod job;
pub mod panel;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use job::{JobStats, JobStatus, JobType, MotionJob};
pub use panel::{PanelMode, PanelStatus};

/// Physical device classes managed by the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Motion controller interpreting the line-oriented command language
    Motion,
    /// Operator input panel with its own token protocol
    Panel,
    /// Auxiliary port for the pen-lift actuator controller
    Remote,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Motion => write!(f, "motion"),
            DeviceType::Panel => write!(f, "panel"),
            DeviceType::Remote => write!(f, "remote"),
        }
    }
}

/// Cartesian position in machine coordinates (millimeters)
///
/// Derived by scanning transmitted lines for coordinate fields.
/// Diagnostic only: the controller owns the authoritative position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a position from explicit coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Drawable machine surface, in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineDimensions {
    /// Surface width along X
    pub width_mm: f64,
    /// Surface height along Y
    pub height_mm: f64,
}

impl Default for MachineDimensions {
    fn default() -> Self {
        Self {
            width_mm: 800.0,
            height_mm: 500.0,
        }
    }
}

/// Per-device connection lifecycle state
///
/// Created at registration, mutated only by the Connection Manager,
/// reset on disconnect rather than destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Whether auto-connect should pursue this device
    pub enabled: bool,
    /// An open link exists
    pub connected: bool,
    /// A connect attempt is in flight
    pub connecting: bool,
    /// Consecutive failed attempts since the last success
    pub retry_count: u32,
    /// Wall-clock time of the most recent attempt
    pub last_attempt: Option<DateTime<Utc>>,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            enabled: true,
            connected: false,
            connecting: false,
            retry_count: 0,
            last_attempt: None,
            last_error: None,
        }
    }
}

/// Outcome counters for one completed or aborted transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransmissionSummary {
    /// Lines in the block after comment/blank stripping
    pub total_lines: usize,
    /// Lines written to the device and resolved by ack or forced advance
    pub lines_sent: usize,
    /// Lines intercepted and routed to the local actuator
    pub lines_intercepted: usize,
    /// Firmware `error:` responses tolerated as non-fatal
    pub protocol_errors: usize,
    /// Ack timeouts that force-advanced the cursor
    pub timeouts: usize,
    /// Spurious firmware resets observed mid-stream
    pub resets: usize,
    /// Wall-clock duration of the transmission in milliseconds
    pub duration_ms: u64,
}
