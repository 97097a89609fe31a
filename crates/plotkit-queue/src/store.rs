//! Durable queue persistence
//!
//! Full-document rewrite of the queue file on every mutation: the whole
//! job list is serialized, written to a sibling temp file, and renamed
//! over the target so a crash never leaves a half-written document.
//! In-memory and on-disk state diverge for at most one mutation.

use chrono::{DateTime, Utc};
use plotkit_core::{MotionJob, QueueError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version of the persisted document format
pub const QUEUE_FILE_VERSION: u32 = 1;

/// On-disk shape of the queue file
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueFile {
    items: Vec<MotionJob>,
    last_updated: DateTime<Utc>,
    version: u32,
}

/// File-backed queue store
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    /// Create a store over the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path this store writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted job list; a missing file is an empty queue
    pub async fn load(&self) -> Result<Vec<MotionJob>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let file: QueueFile = serde_json::from_str(&content).map_err(|e| {
                    QueueError::PersistFailed {
                        reason: format!("invalid queue file {}: {}", self.path.display(), e),
                    }
                })?;
                if file.version != QUEUE_FILE_VERSION {
                    tracing::warn!(
                        "Queue file version {} (expected {}); loading anyway",
                        file.version,
                        QUEUE_FILE_VERSION
                    );
                }
                Ok(file.items)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(QueueError::PersistFailed {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            }
            .into()),
        }
    }

    /// Rewrite the full document durably
    pub async fn save(&self, items: &[MotionJob]) -> Result<()> {
        let file = QueueFile {
            items: items.to_vec(),
            last_updated: Utc::now(),
            version: QUEUE_FILE_VERSION,
        };

        let content = serde_json::to_string_pretty(&file).map_err(|e| QueueError::PersistFailed {
            reason: format!("serialization failed: {}", e),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| QueueError::PersistFailed {
                reason: format!("failed to write {}: {}", tmp.display(), e),
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| QueueError::PersistFailed {
                reason: format!("failed to replace {}: {}", self.path.display(), e),
            })?;

        Ok(())
    }
}
