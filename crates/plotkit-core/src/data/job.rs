//! Motion job records
//!
//! A job wraps one motion-command block together with its lifecycle
//! status and timing fields. Jobs are created on enqueue, mutated in
//! place by the queue processor, removed on success, and retained on
//! failure for operator inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Origin of a motion job's command text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Traced from a raster image
    Image,
    /// Rendered from stroke-font text
    Text,
    /// Captured freehand pen strokes
    Pen,
    /// Full-canvas composition
    Canvas,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Image => write!(f, "image"),
            JobType::Text => write!(f, "text"),
            JobType::Pen => write!(f, "pen"),
            JobType::Canvas => write!(f, "canvas"),
        }
    }
}

/// Lifecycle status of a motion job
///
/// Legal transitions: `Pending → Processing → Completed | Failed`.
/// Completed jobs are removed from the queue; failed jobs are retained
/// and never auto-retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for the processor
    Pending,
    /// Currently streaming to the device
    Processing,
    /// Streamed to completion
    Completed,
    /// Aborted; retained with its error message
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Static statistics computed from the job's motion text at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    /// Streamable lines after blank/comment stripping
    pub total_lines: usize,
    /// Lines destined for the motion controller
    pub device_lines: usize,
    /// Lines intercepted for the local actuator
    pub actuator_lines: usize,
}

/// One motion job in the persisted queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionJob {
    /// Unique job id
    pub id: String,
    /// Origin of the motion text
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Lifecycle status
    pub status: JobStatus,
    /// The full motion-command block for this job
    pub motion_text: String,
    /// Line statistics computed at enqueue time
    pub stats: JobStats,
    /// Enqueue timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the processor picks the job up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_start_time: Option<DateTime<Utc>>,
    /// Set when streaming ends, successfully or not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_end_time: Option<DateTime<Utc>>,
    /// Set on successful completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message, present only for failed jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cursor of the in-flight transmission, for progress display
    #[serde(default)]
    pub current_line: usize,
}

impl MotionJob {
    /// Create a fresh pending job
    pub fn new(job_type: JobType, motion_text: impl Into<String>, stats: JobStats) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            motion_text: motion_text.into(),
            stats,
            created_at: Utc::now(),
            processing_start_time: None,
            processing_end_time: None,
            completed_at: None,
            error: None,
            current_line: 0,
        }
    }

    /// Whether the processor may pick this job up
    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_with_unique_id() {
        let a = MotionJob::new(JobType::Text, "G21\nM2", JobStats::default());
        let b = MotionJob::new(JobType::Text, "G21\nM2", JobStats::default());
        assert!(a.is_pending());
        assert_ne!(a.id, b.id);
        assert!(a.error.is_none());
    }

    #[test]
    fn serde_uses_camel_case_field_names() {
        let job = MotionJob::new(JobType::Image, "G0 X1", JobStats::default());
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"motionText\""));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"type\":\"image\""));
        // Unset optionals stay out of the document entirely.
        assert!(!json.contains("completedAt"));
    }
}
