//! Connection lifecycle management
//!
//! Auto-connect/reconnect per named device type. Each registered device
//! carries its own `ConnectionState`, mutated only here; failures
//! schedule a backoff retry, successes reset the retry counter, and a
//! watch task converts link closure into a disconnect + reschedule.
//! Retries for different device types are independent and may overlap
//! with an active transmission.

use crate::link::{DeviceAdapter, DeviceLink, DeviceLinkProvider};
use chrono::Utc;
use parking_lot::Mutex;
use plotkit_core::{
    AppEvent, ConfigError, ConnectionEvent, ConnectionState, DeviceType, EventBus, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Backoff policy for reconnect attempts
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for the backoff curve
    pub max_delay: Duration,
    /// Stagger before the initial auto-connect attempt
    pub initial_stagger: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            initial_stagger: Duration::from_millis(500),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry `attempt` (1-based): `base * 1.5^(attempt-1)`,
    /// clamped to `max_delay`
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let factor = 1.5_f64.powi(attempt as i32 - 1);
        let delay_ms = self.base_delay.as_millis() as f64 * factor;
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

struct DeviceEntry {
    adapter: Arc<dyn DeviceAdapter>,
    port: String,
    state: ConnectionState,
    link: Option<Arc<dyn DeviceLink>>,
    retry_task: Option<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
}

impl DeviceEntry {
    fn cancel_retry(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }

    fn cancel_watch(&mut self) {
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
    }
}

/// Auto-connect/reconnect lifecycle per device type
pub struct ConnectionManager {
    devices: Mutex<HashMap<DeviceType, DeviceEntry>>,
    bus: Arc<EventBus>,
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    /// Create a manager publishing lifecycle events on `bus`
    pub fn new(bus: Arc<EventBus>, policy: ReconnectPolicy) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            bus,
            policy,
        }
    }

    /// Register a device type with its adapter and target port
    pub fn register_device(&self, device: DeviceType, port: &str, adapter: Arc<dyn DeviceAdapter>) {
        let mut devices = self.devices.lock();
        devices.insert(
            device,
            DeviceEntry {
                adapter,
                port: port.to_string(),
                state: ConnectionState::default(),
                link: None,
                retry_task: None,
                watch_task: None,
            },
        );
    }

    /// Snapshot of a device's connection state
    pub fn state(&self, device: DeviceType) -> Option<ConnectionState> {
        self.devices.lock().get(&device).map(|e| e.state.clone())
    }

    /// Enable or disable a device type
    ///
    /// Disabling cancels any pending retry timer; an open link is left
    /// alone until it drops on its own or `shutdown` closes it.
    pub fn set_enabled(&self, device: DeviceType, enabled: bool) -> Result<()> {
        let mut devices = self.devices.lock();
        let entry = devices
            .get_mut(&device)
            .ok_or(ConfigError::UnknownDevice { device })?;
        entry.state.enabled = enabled;
        if !enabled {
            entry.cancel_retry();
        }
        Ok(())
    }

    /// Kick off one staggered connect attempt per enabled device
    pub fn start_auto_connect(self: &Arc<Self>) {
        let targets: Vec<DeviceType> = {
            let devices = self.devices.lock();
            devices
                .iter()
                .filter(|(_, e)| e.state.enabled)
                .map(|(d, _)| *d)
                .collect()
        };

        for device in targets {
            let manager = self.clone();
            let stagger = self.policy.initial_stagger;
            tokio::spawn(async move {
                tokio::time::sleep(stagger).await;
                if let Err(e) = manager.attempt_connect(device).await {
                    tracing::warn!("Auto-connect for {} failed: {}", device, e);
                }
            });
        }
    }

    /// Perform one connect attempt for a device
    ///
    /// Idempotent: returns `true` if already connected, `false` if an
    /// attempt is in flight or the device is disabled, otherwise performs
    /// one attempt. A failed attempt schedules a backoff retry.
    pub async fn attempt_connect(self: &Arc<Self>, device: DeviceType) -> Result<bool> {
        let (adapter, port) = {
            let mut devices = self.devices.lock();
            let entry = devices
                .get_mut(&device)
                .ok_or(ConfigError::UnknownDevice { device })?;

            if !entry.state.enabled {
                return Ok(false);
            }
            if entry.state.connected {
                return Ok(true);
            }
            if entry.state.connecting {
                return Ok(false);
            }

            entry.state.connecting = true;
            entry.state.last_attempt = Some(Utc::now());
            (entry.adapter.clone(), entry.port.clone())
        };

        tracing::debug!("Connecting {} on {}", device, port);

        match adapter.connect(&port).await {
            Ok(link) => {
                {
                    let mut devices = self.devices.lock();
                    if let Some(entry) = devices.get_mut(&device) {
                        entry.state.connecting = false;
                        entry.state.connected = true;
                        entry.state.retry_count = 0;
                        entry.state.last_error = None;
                        entry.cancel_retry();
                        entry.cancel_watch();
                        entry.watch_task = Some(self.spawn_watch(device, link.clone()));
                        entry.link = Some(link);
                    }
                }
                tracing::info!("{} connected on {}", device, port);
                self.bus
                    .publish(AppEvent::Connection(ConnectionEvent::Connected {
                        device,
                        port,
                    }));
                Ok(true)
            }
            Err(e) => {
                let scheduled = {
                    let mut devices = self.devices.lock();
                    match devices.get_mut(&device) {
                        Some(entry) => {
                            entry.state.connecting = false;
                            entry.state.retry_count += 1;
                            entry.state.last_error = Some(e.to_string());
                            let attempt = entry.state.retry_count;
                            if entry.state.enabled {
                                let delay = self.policy.retry_delay(attempt);
                                entry.cancel_retry();
                                entry.retry_task = Some(self.spawn_retry(device, delay));
                                Some((attempt, delay))
                            } else {
                                None
                            }
                        }
                        None => None,
                    }
                };

                tracing::warn!("{} connect failed: {}", device, e);
                self.bus
                    .publish(AppEvent::Connection(ConnectionEvent::AttemptFailed {
                        device,
                        reason: e.to_string(),
                    }));
                if let Some((attempt, delay)) = scheduled {
                    self.bus
                        .publish(AppEvent::Connection(ConnectionEvent::RetryScheduled {
                            device,
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        }));
                }
                Ok(false)
            }
        }
    }

    /// Mark a device disconnected and reschedule if still enabled
    pub async fn handle_disconnect(self: &Arc<Self>, device: DeviceType, reason: &str) {
        let scheduled = {
            let mut devices = self.devices.lock();
            let Some(entry) = devices.get_mut(&device) else {
                return;
            };
            if !entry.state.connected {
                return;
            }

            entry.state.connected = false;
            entry.link = None;
            entry.cancel_watch();

            if entry.state.enabled {
                let attempt = entry.state.retry_count.max(1);
                let delay = self.policy.retry_delay(attempt);
                entry.cancel_retry();
                entry.retry_task = Some(self.spawn_retry(device, delay));
                Some((attempt, delay))
            } else {
                None
            }
        };

        tracing::warn!("{} disconnected: {}", device, reason);
        self.bus
            .publish(AppEvent::Connection(ConnectionEvent::Disconnected {
                device,
                reason: reason.to_string(),
            }));
        if let Some((attempt, delay)) = scheduled {
            self.bus
                .publish(AppEvent::Connection(ConnectionEvent::RetryScheduled {
                    device,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                }));
        }
    }

    /// Disable every device, cancel timers, and close open links
    pub async fn shutdown(&self) {
        let links: Vec<Arc<dyn DeviceLink>> = {
            let mut devices = self.devices.lock();
            devices
                .values_mut()
                .filter_map(|entry| {
                    entry.state.enabled = false;
                    entry.cancel_retry();
                    entry.cancel_watch();
                    entry.state.connected = false;
                    entry.link.take()
                })
                .collect()
        };

        for link in links {
            if let Err(e) = link.close().await {
                tracing::warn!("Closing {} link failed: {}", link.device_type(), e);
            }
        }
    }

    fn spawn_retry(self: &Arc<Self>, device: DeviceType, delay: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = manager.attempt_connect(device).await {
                tracing::warn!("Retry for {} failed: {}", device, e);
            }
        })
    }

    fn spawn_watch(
        self: &Arc<Self>,
        device: DeviceType,
        link: Arc<dyn DeviceLink>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut rx = link.subscribe_lines();
            loop {
                match rx.recv().await {
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("{} watch lagged {} lines", device, skipped);
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        manager.handle_disconnect(device, "link closed").await;
                        break;
                    }
                }
            }
        })
    }
}

impl DeviceLinkProvider for ConnectionManager {
    fn link(&self, device: DeviceType) -> Option<Arc<dyn DeviceLink>> {
        self.devices.lock().get(&device).and_then(|e| e.link.clone())
    }
}
