//! Listener lifecycle guard
//!
//! Tracks every subscription placed on a device line stream. Each
//! registration is a scoped handle released on drop, so teardown happens
//! on every exit path; a supervisory sweep force-expires registrations
//! that outlive their TTL and logs the leak. Per-(device, event) caps
//! reject runaway subscription at the boundary.

use parking_lot::Mutex;
use plotkit_core::{ConfigError, DeviceType, Result};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Configuration for the listener guard
#[derive(Debug, Clone)]
pub struct ListenerGuardConfig {
    /// Maximum simultaneous registrations per (device, event)
    pub max_per_event: usize,
    /// Age at which the sweeper force-expires a registration
    pub ttl: Duration,
    /// Interval of the supervisory sweep
    pub sweep_interval: Duration,
}

impl Default for ListenerGuardConfig {
    fn default() -> Self {
        Self {
            max_per_event: 8,
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct Registration {
    id: Uuid,
    registered_at: Instant,
}

type ListenerKey = (DeviceType, String);

struct GuardInner {
    config: ListenerGuardConfig,
    table: Mutex<HashMap<ListenerKey, Vec<Registration>>>,
}

impl GuardInner {
    fn release(&self, key: &ListenerKey, id: Uuid) {
        let mut table = self.table.lock();
        if let Some(entries) = table.get_mut(key) {
            entries.retain(|r| r.id != id);
            if entries.is_empty() {
                table.remove(key);
            }
        }
    }
}

/// Scoped registration on a device line stream
///
/// Dropping the handle releases the registration.
#[derive(Debug)]
pub struct ListenerHandle {
    id: Uuid,
    key: ListenerKey,
    inner: Weak<GuardInner>,
}

impl ListenerHandle {
    /// Unique id of this registration
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.release(&self.key, self.id);
        }
    }
}

/// Guard over all line-stream subscriptions
#[derive(Clone)]
pub struct ListenerGuard {
    inner: Arc<GuardInner>,
}

impl ListenerGuard {
    /// Create a guard with the given configuration
    pub fn new(config: ListenerGuardConfig) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                config,
                table: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a listener on (device, event)
    ///
    /// Rejected at the cap; the stream itself is untouched either way.
    pub fn register(&self, device: DeviceType, event: &str) -> Result<ListenerHandle> {
        let key = (device, event.to_string());
        let mut table = self.inner.table.lock();
        let entries = table.entry(key.clone()).or_default();

        if entries.len() >= self.inner.config.max_per_event {
            return Err(ConfigError::ListenerLimit {
                device,
                event: event.to_string(),
                limit: self.inner.config.max_per_event,
            }
            .into());
        }

        let id = Uuid::new_v4();
        entries.push(Registration {
            id,
            registered_at: Instant::now(),
        });

        Ok(ListenerHandle {
            id,
            key,
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Active registrations for (device, event)
    pub fn active_count(&self, device: DeviceType, event: &str) -> usize {
        self.inner
            .table
            .lock()
            .get(&(device, event.to_string()))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Force-expire registrations older than the TTL
    ///
    /// Safety net only; well-behaved callers drop their handles first.
    /// Returns the number of expired registrations.
    pub fn sweep(&self) -> usize {
        let ttl = self.inner.config.ttl;
        let mut expired = 0;
        let mut table = self.inner.table.lock();

        table.retain(|key, entries| {
            entries.retain(|r| {
                let keep = r.registered_at.elapsed() <= ttl;
                if !keep {
                    expired += 1;
                    tracing::warn!(
                        "Force-expiring stale listener {} on {}/{}",
                        r.id,
                        key.0,
                        key.1
                    );
                }
                keep
            });
            !entries.is_empty()
        });

        expired
    }

    /// Spawn the supervisory sweep task
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let guard = self.clone();
        let interval = guard.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                guard.sweep();
            }
        })
    }
}

impl Default for ListenerGuard {
    fn default() -> Self {
        Self::new(ListenerGuardConfig::default())
    }
}
