//! Single-flight queue processor
//!
//! Drains the queue oldest-pending-first, one job at a time, through
//! the transmission engine. A concurrent `start_processing` call is
//! rejected, never queued. A job that loses the engine gate to a direct
//! transmission is reverted to pending untouched; any other failure
//! marks it failed and retained, and the loop moves on.

use crate::queue::JobQueue;
use plotkit_core::{
    AppEvent, DeviceType, EngineError, EventBus, QueueError, QueueEvent, Result,
};
use plotkit_devices::DeviceLinkProvider;
use plotkit_engine::{SendMode, TransmissionEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Counters for one processing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingReport {
    /// Jobs streamed to completion and removed
    pub completed: usize,
    /// Jobs marked failed and retained
    pub failed: usize,
}

/// Single-flight loop driving jobs through the transmission engine
pub struct QueueProcessor {
    queue: Arc<JobQueue>,
    engine: Arc<TransmissionEngine>,
    provider: Arc<dyn DeviceLinkProvider>,
    bus: Arc<EventBus>,
    running: AtomicBool,
}

struct RunningReset<'a>(&'a AtomicBool);

impl Drop for RunningReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl QueueProcessor {
    /// Create a processor over the given queue and engine
    pub fn new(
        queue: Arc<JobQueue>,
        engine: Arc<TransmissionEngine>,
        provider: Arc<dyn DeviceLinkProvider>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            queue,
            engine,
            provider,
            bus,
            running: AtomicBool::new(false),
        }
    }

    /// Whether a processing run is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Process pending jobs until none remain
    ///
    /// Single-flight: a second call while one runs fails immediately
    /// with [`QueueError::ProcessorBusy`]. Every status transition is
    /// persisted before the next job proceeds.
    pub async fn start_processing(&self) -> Result<ProcessingReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QueueError::ProcessorBusy.into());
        }
        let _reset = RunningReset(&self.running);

        self.bus
            .publish(AppEvent::Queue(QueueEvent::ProcessingStarted));
        let mut report = ProcessingReport::default();

        while let Some(job) = self.queue.next_pending() {
            let Some(link) = self.provider.link(DeviceType::Motion) else {
                tracing::warn!("Processing halted: motion controller not connected");
                return Err(EngineError::NotConnected {
                    device: DeviceType::Motion,
                }
                .into());
            };

            tracing::info!("Processing job {} ({} lines)", job.id, job.stats.total_lines);
            self.queue.mark_processing(&job.id).await?;

            match self
                .engine
                .send(&job.motion_text, link, SendMode::Writing)
                .await
            {
                Ok(summary) => {
                    self.queue.complete_job(&job.id, summary).await?;
                    report.completed += 1;
                }
                Err(e) if e.is_busy() => {
                    // A direct transmission raced us for the engine gate;
                    // the job goes back untouched.
                    self.queue.mark_pending(&job.id).await?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Job {} failed: {}", job.id, e);
                    self.queue.fail_job(&job.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        self.bus
            .publish(AppEvent::Queue(QueueEvent::ProcessingFinished {
                completed: report.completed,
                failed: report.failed,
            }));
        Ok(report)
    }
}
