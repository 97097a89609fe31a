//! Bounded activity log
//!
//! Append-only ring buffer of recent control-plane activity with
//! oldest-eviction, surfaced to the presentation layer for an operator
//! timeline. Capacity is fixed at construction (100 entries by default).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default ring capacity
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;

/// One timestamped activity line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// When the entry was appended
    pub at: DateTime<Utc>,
    /// Human-readable activity message
    pub message: String,
}

/// Bounded, append-only activity ring
pub struct ActivityLog {
    entries: RwLock<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl ActivityLog {
    /// Create a log with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_CAPACITY)
    }

    /// Create a log with a custom capacity (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, evicting the oldest entry when full
    pub fn push(&self, message: impl Into<String>) {
        let mut entries = self.entries.write();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Snapshot of all retained entries, oldest first
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.read().iter().cloned().collect()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_snapshot_preserve_order() {
        let log = ActivityLog::new();
        log.push("first");
        log.push("second");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let log = ActivityLog::with_capacity(3);
        for i in 0..5 {
            log.push(format!("entry {}", i));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "entry 2");
        assert_eq!(entries[2].message, "entry 4");
    }

    #[test]
    fn default_capacity_is_one_hundred() {
        let log = ActivityLog::new();
        for i in 0..250 {
            log.push(format!("{}", i));
        }
        assert_eq!(log.len(), 100);
        assert_eq!(log.entries()[0].message, "150");
    }
}
