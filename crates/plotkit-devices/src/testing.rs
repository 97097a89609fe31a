//! Test doubles for device links and actuators
//!
//! Used by the engine, queue, and panel crates to exercise streaming
//! behavior without hardware: a scripted link that answers writes from a
//! canned response table, an adapter that fails a fixed number of times,
//! and an actuator that records the angles it was asked for.

use crate::actuator::LocalActuator;
use crate::link::{DeviceAdapter, DeviceLink};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use plotkit_core::{DeviceType, Result, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// In-memory link answering each write from a scripted response table
///
/// Every write is recorded. Responses for a write are broadcast
/// immediately: the next scripted batch if one remains, otherwise the
/// default batch. Unsolicited lines (boot banners, panel triggers) are
/// injected with [`ScriptedLink::inject`].
pub struct ScriptedLink {
    device_type: DeviceType,
    path: String,
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Vec<String>>>,
    default_responses: Vec<String>,
    lines_tx: RwLock<Option<broadcast::Sender<String>>>,
}

impl ScriptedLink {
    fn new(device_type: DeviceType, default_responses: Vec<String>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(256);
        Arc::new(Self {
            device_type,
            path: format!("scripted-{}", device_type),
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            default_responses,
            lines_tx: RwLock::new(Some(tx)),
        })
    }

    /// Link acknowledging every write with `ok`
    pub fn acking(device_type: DeviceType) -> Arc<Self> {
        Self::new(device_type, vec!["ok".to_string()])
    }

    /// Link that never answers; every ack wait times out
    pub fn silent(device_type: DeviceType) -> Arc<Self> {
        Self::new(device_type, Vec::new())
    }

    /// Link answering writes from `batches` in order, then `ok`
    pub fn with_script<S: Into<String> + Clone>(
        device_type: DeviceType,
        batches: &[&[S]],
    ) -> Arc<Self> {
        let link = Self::new(device_type, vec!["ok".to_string()]);
        {
            let mut script = link.script.lock();
            for batch in batches {
                script.push_back(batch.iter().cloned().map(Into::into).collect());
            }
        }
        link
    }

    /// Inject an unsolicited line into the stream
    pub fn inject(&self, line: &str) {
        if let Some(tx) = self.lines_tx.read().as_ref() {
            let _ = tx.send(line.to_string());
        }
    }

    /// Lines written to the link, in order
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DeviceLink for ScriptedLink {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::ConnectionLost {
                device: self.device_type,
                reason: "link closed".to_string(),
            }
            .into());
        }

        self.sent.lock().push(line.to_string());

        let responses = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_responses.clone());
        for response in responses {
            self.inject(&response);
        }

        Ok(())
    }

    fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        match self.lines_tx.read().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.lines_tx.write().take();
        Ok(())
    }
}

/// Adapter that fails a fixed number of connects, then succeeds
pub struct ScriptedAdapter {
    device_type: DeviceType,
    fail_remaining: Mutex<u32>,
    connect_calls: AtomicUsize,
    last_link: Mutex<Option<Arc<ScriptedLink>>>,
}

impl ScriptedAdapter {
    /// Adapter whose connects always succeed
    pub fn succeeding(device_type: DeviceType) -> Self {
        Self::failing_times(device_type, 0)
    }

    /// Adapter whose first `failures` connects fail
    pub fn failing_times(device_type: DeviceType, failures: u32) -> Self {
        Self {
            device_type,
            fail_remaining: Mutex::new(failures),
            connect_calls: AtomicUsize::new(0),
            last_link: Mutex::new(None),
        }
    }

    /// Number of connect calls observed
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// The most recently handed-out link
    pub fn last_link(&self) -> Option<Arc<ScriptedLink>> {
        self.last_link.lock().clone()
    }
}

#[async_trait]
impl DeviceAdapter for ScriptedAdapter {
    async fn connect(&self, port: &str) -> Result<Arc<dyn DeviceLink>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut remaining = self.fail_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::FailedToOpen {
                    port: port.to_string(),
                    reason: "scripted failure".to_string(),
                }
                .into());
            }
        }

        let link = ScriptedLink::acking(self.device_type);
        *self.last_link.lock() = Some(link.clone());
        Ok(link)
    }

    async fn disconnect(&self, link: &Arc<dyn DeviceLink>) -> Result<()> {
        link.close().await
    }
}

/// Actuator recording every requested angle
#[derive(Default)]
pub struct RecordingActuator {
    angles: Mutex<Vec<u8>>,
}

impl RecordingActuator {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Angles requested so far, in order
    pub fn angles(&self) -> Vec<u8> {
        self.angles.lock().clone()
    }
}

#[async_trait]
impl LocalActuator for RecordingActuator {
    async fn set_angle(&self, angle: u8) -> Result<()> {
        self.angles.lock().push(angle);
        Ok(())
    }
}
