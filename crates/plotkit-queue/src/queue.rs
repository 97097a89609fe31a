//! Ordered, persisted motion-job queue
//!
//! Every mutation is immediately followed by a durable full-queue write
//! under a mutation gate, so the persisted document trails the in-memory
//! list by at most one mutation. Selection is FIFO over pending jobs;
//! explicit index-based reorder and removal are allowed only before a
//! job starts processing.

use crate::store::QueueStore;
use chrono::Utc;
use parking_lot::RwLock;
use plotkit_core::{
    AppEvent, ConfigError, EventBus, JobStats, JobStatus, JobType, MotionJob, QueueError,
    QueueEvent, Result, TransmissionSummary,
};
use plotkit_engine::{split_block, MotionLine};
use std::sync::Arc;

/// Persisted ordered queue of motion jobs
pub struct JobQueue {
    items: RwLock<Vec<MotionJob>>,
    store: QueueStore,
    bus: Arc<EventBus>,
    // Serializes mutate-then-persist sequences across tasks.
    mutation_gate: tokio::sync::Mutex<()>,
}

impl JobQueue {
    /// Create a queue over the given store
    pub fn new(store: QueueStore, bus: Arc<EventBus>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            store,
            bus,
            mutation_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Restore the queue from disk
    ///
    /// Jobs left in `Processing` by a crashed run are demoted to
    /// `Pending` so they are picked up again.
    pub async fn load(&self) -> Result<()> {
        let mut items = self.store.load().await?;
        let mut demoted = 0;
        for job in &mut items {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                job.processing_start_time = None;
                demoted += 1;
            }
        }
        if demoted > 0 {
            tracing::info!("Demoted {} interrupted job(s) back to pending", demoted);
            self.store.save(&items).await?;
        }

        tracing::info!("Loaded {} queued job(s)", items.len());
        *self.items.write() = items;
        Ok(())
    }

    /// Enqueue a new job built from a motion-command block
    pub async fn enqueue(&self, job_type: JobType, motion_text: &str) -> Result<MotionJob> {
        let lines = split_block(motion_text);
        if lines.is_empty() {
            return Err(ConfigError::MissingField {
                field: "motion_text".to_string(),
            }
            .into());
        }

        let actuator_lines = lines
            .iter()
            .filter(|l| matches!(l, MotionLine::PenLift { .. }))
            .count();
        let stats = JobStats {
            total_lines: lines.len(),
            device_lines: lines.len() - actuator_lines,
            actuator_lines,
        };

        let job = MotionJob::new(job_type, motion_text, stats);

        let _gate = self.mutation_gate.lock().await;
        self.items.write().push(job.clone());
        self.persist().await?;

        self.bus.publish(AppEvent::Queue(QueueEvent::JobAdded {
            job: Box::new(job.clone()),
        }));
        Ok(job)
    }

    /// Remove the job at `index`
    pub async fn remove_at(&self, index: usize) -> Result<MotionJob> {
        let _gate = self.mutation_gate.lock().await;
        let removed = {
            let mut items = self.items.write();
            let len = items.len();
            if index >= len {
                return Err(QueueError::IndexOutOfRange { index, len }.into());
            }
            if items[index].status == JobStatus::Processing {
                return Err(QueueError::JobProcessing {
                    id: items[index].id.clone(),
                }
                .into());
            }
            items.remove(index)
        };
        self.persist().await?;

        self.bus.publish(AppEvent::Queue(QueueEvent::JobRemoved {
            id: removed.id.clone(),
        }));
        Ok(removed)
    }

    /// Relocate the job at `from` to position `to`
    ///
    /// All other jobs keep their relative order.
    pub async fn move_job(&self, from: usize, to: usize) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        {
            let mut items = self.items.write();
            let len = items.len();
            if from >= len {
                return Err(QueueError::IndexOutOfRange { index: from, len }.into());
            }
            if to >= len {
                return Err(QueueError::IndexOutOfRange { index: to, len }.into());
            }
            if items[from].status == JobStatus::Processing {
                return Err(QueueError::JobProcessing {
                    id: items[from].id.clone(),
                }
                .into());
            }
            let job = items.remove(from);
            items.insert(to, job);
        }
        self.persist().await?;

        self.bus
            .publish(AppEvent::Queue(QueueEvent::JobMoved { from, to }));
        Ok(())
    }

    /// Empty the queue
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        self.items.write().clear();
        self.persist().await?;

        self.bus.publish(AppEvent::Queue(QueueEvent::Cleared));
        Ok(())
    }

    /// Snapshot of all jobs in queue order
    pub fn get_all(&self) -> Vec<MotionJob> {
        self.items.read().clone()
    }

    /// Number of jobs, all statuses
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the queue holds no jobs at all
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Number of jobs still waiting for the processor
    pub fn pending_count(&self) -> usize {
        self.items.read().iter().filter(|j| j.is_pending()).count()
    }

    /// Oldest pending job, if any (FIFO selection)
    pub fn next_pending(&self) -> Option<MotionJob> {
        self.items.read().iter().find(|j| j.is_pending()).cloned()
    }

    /// Mark a job processing and stamp its start time
    pub async fn mark_processing(&self, id: &str) -> Result<()> {
        self.transition(id, |job| {
            job.status = JobStatus::Processing;
            job.processing_start_time = Some(Utc::now());
            job.current_line = 0;
        })
        .await
    }

    /// Revert a job to pending, undoing `mark_processing`
    pub async fn mark_pending(&self, id: &str) -> Result<()> {
        self.transition(id, |job| {
            job.status = JobStatus::Pending;
            job.processing_start_time = None;
        })
        .await
    }

    /// Record a successful transmission and remove the job
    pub async fn complete_job(&self, id: &str, summary: TransmissionSummary) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        {
            let mut items = self.items.write();
            let Some(pos) = items.iter().position(|j| j.id == id) else {
                return Err(QueueError::JobNotFound { id: id.to_string() }.into());
            };
            let job = &mut items[pos];
            job.status = JobStatus::Completed;
            job.processing_end_time = Some(Utc::now());
            job.completed_at = Some(Utc::now());
            job.current_line = summary.lines_sent + summary.lines_intercepted;
            items.remove(pos);
        }
        self.persist().await?;

        self.bus
            .publish(AppEvent::Queue(QueueEvent::JobStatusChanged {
                id: id.to_string(),
                status: JobStatus::Completed.to_string(),
            }));
        self.bus.publish(AppEvent::Queue(QueueEvent::JobRemoved {
            id: id.to_string(),
        }));
        Ok(())
    }

    /// Record a failed transmission; the job is retained, never retried
    pub async fn fail_job(&self, id: &str, error: &str) -> Result<()> {
        self.transition(id, |job| {
            job.status = JobStatus::Failed;
            job.processing_end_time = Some(Utc::now());
            job.error = Some(error.to_string());
        })
        .await
    }

    async fn transition(&self, id: &str, mutate: impl FnOnce(&mut MotionJob)) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        let status = {
            let mut items = self.items.write();
            let Some(job) = items.iter_mut().find(|j| j.id == id) else {
                return Err(QueueError::JobNotFound { id: id.to_string() }.into());
            };
            mutate(job);
            job.status
        };
        self.persist().await?;

        self.bus
            .publish(AppEvent::Queue(QueueEvent::JobStatusChanged {
                id: id.to_string(),
                status: status.to_string(),
            }));
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.items.read().clone();
        self.store.save(&snapshot).await
    }
}
