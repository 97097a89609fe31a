//! Queue persistence and processing behavior

use parking_lot::Mutex;
use plotkit_core::{DeviceType, EventBus, JobStatus, JobType};
use plotkit_devices::testing::ScriptedLink;
use plotkit_devices::{DeviceLink, DeviceLinkProvider, ListenerGuard, NoOpActuator};
use plotkit_engine::{EngineConfig, NoOpPanelPort, TransmissionEngine};
use plotkit_queue::{JobQueue, QueueProcessor, QueueStore};
use std::sync::Arc;
use std::time::Duration;

/// Provider handing out one preset link, swappable mid-test
struct StaticProvider {
    link: Mutex<Option<Arc<dyn DeviceLink>>>,
}

impl StaticProvider {
    fn new(link: Option<Arc<dyn DeviceLink>>) -> Arc<Self> {
        Arc::new(Self {
            link: Mutex::new(link),
        })
    }
}

impl DeviceLinkProvider for StaticProvider {
    fn link(&self, device: DeviceType) -> Option<Arc<dyn DeviceLink>> {
        match device {
            DeviceType::Motion => self.link.lock().clone(),
            _ => None,
        }
    }
}

fn test_engine(ack_timeout: Duration) -> Arc<TransmissionEngine> {
    Arc::new(TransmissionEngine::new(
        EngineConfig {
            ack_timeout,
            settle_delay: Duration::from_millis(5),
            max_consecutive_timeouts: 5,
            halt_on_error: false,
        },
        ListenerGuard::default(),
        Arc::new(NoOpActuator),
        Arc::new(NoOpPanelPort),
        Arc::new(EventBus::new()),
    ))
}

struct Rig {
    queue: Arc<JobQueue>,
    processor: QueueProcessor,
    engine: Arc<TransmissionEngine>,
    _dir: tempfile::TempDir,
}

fn rig(link: Option<Arc<dyn DeviceLink>>, ack_timeout: Duration) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(EventBus::new());
    let queue = Arc::new(JobQueue::new(
        QueueStore::new(dir.path().join("queue.json")),
        bus.clone(),
    ));
    let engine = test_engine(ack_timeout);
    let provider = StaticProvider::new(link);
    let processor = QueueProcessor::new(queue.clone(), engine.clone(), provider, bus);
    Rig {
        queue,
        processor,
        engine,
        _dir: dir,
    }
}

#[tokio::test]
async fn acknowledged_job_completes_and_leaves_the_queue() {
    let link = ScriptedLink::acking(DeviceType::Motion);
    let rig = rig(Some(link.clone()), Duration::from_millis(100));

    rig.queue
        .enqueue(JobType::Text, "G21\nG90\nG0 X10 Y10\nM2")
        .await
        .unwrap();

    let report = rig.processor.start_processing().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    // Four lines observed at the device, in original order.
    assert_eq!(link.sent_lines(), vec!["G21", "G90", "G0 X10 Y10", "M2"]);
    assert_eq!(rig.queue.len(), 0);
}

#[tokio::test]
async fn unresponsive_device_fails_job_and_retains_it() {
    let link = ScriptedLink::silent(DeviceType::Motion);
    let rig = rig(Some(link), Duration::from_millis(15));

    let job = rig.queue.enqueue(JobType::Image, "G0 X1\nG0 X2\nG0 X3\nG0 X4\nG0 X5\nG0 X6").await.unwrap();

    let report = rig.processor.start_processing().await.unwrap();
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed, 1);

    let jobs = rig.queue.get_all();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job.id);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(jobs[0].error.as_deref().unwrap().contains("unresponsive"));

    // Failed jobs are never auto-retried: a second run finds nothing pending.
    let report = rig.processor.start_processing().await.unwrap();
    assert_eq!(report, plotkit_queue::ProcessingReport::default());
    assert_eq!(rig.queue.get_all()[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn processing_without_a_link_leaves_jobs_pending() {
    let rig = rig(None, Duration::from_millis(50));
    rig.queue.enqueue(JobType::Pen, "G0 X1").await.unwrap();

    let err = rig.processor.start_processing().await.unwrap_err();
    assert!(err.to_string().contains("not connected"));
    assert_eq!(rig.queue.get_all()[0].status, JobStatus::Pending);
}

#[tokio::test]
async fn direct_transmission_race_reverts_job_to_pending() {
    let link = ScriptedLink::acking(DeviceType::Motion);
    let rig = rig(Some(link), Duration::from_secs(5));

    rig.queue.enqueue(JobType::Canvas, "G0 X1\nM2").await.unwrap();

    // A direct transmission holds the engine gate.
    let engine = rig.engine.clone();
    let stuck = ScriptedLink::silent(DeviceType::Motion);
    let holder = tokio::spawn(async move {
        let _ = engine
            .send("G0 X9", stuck, plotkit_engine::SendMode::Pen(1))
            .await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = rig.processor.start_processing().await.unwrap_err();
    assert!(err.is_busy());

    // Contention left queue state unchanged.
    let jobs = rig.queue.get_all();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Pending);

    holder.abort();
}

#[tokio::test]
async fn concurrent_processing_is_rejected() {
    let link = ScriptedLink::silent(DeviceType::Motion);
    let rig = rig(Some(link), Duration::from_secs(5));
    rig.queue.enqueue(JobType::Text, "G0 X1").await.unwrap();

    let rig = Arc::new(rig);
    let first = {
        let rig = rig.clone();
        tokio::spawn(async move {
            let _ = rig.processor.start_processing().await;
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rig.processor.is_running());

    let err = rig.processor.start_processing().await.unwrap_err();
    assert!(err.is_busy());

    first.abort();
}

#[tokio::test]
async fn mutations_rewrite_the_persisted_document() {
    let rig = rig(None, Duration::from_millis(50));
    let path = rig._dir.path().join("queue.json");

    let job_a = rig.queue.enqueue(JobType::Text, "G0 X1").await.unwrap();
    let _job_b = rig.queue.enqueue(JobType::Text, "G0 X2").await.unwrap();

    let on_disk = QueueStore::new(&path).load().await.unwrap();
    assert_eq!(on_disk.len(), 2);
    assert_eq!(on_disk[0].id, job_a.id);

    rig.queue.remove_at(0).await.unwrap();
    let on_disk = QueueStore::new(&path).load().await.unwrap();
    assert_eq!(on_disk.len(), 1);
    assert_ne!(on_disk[0].id, job_a.id);

    rig.queue.clear().await.unwrap();
    let on_disk = QueueStore::new(&path).load().await.unwrap();
    assert!(on_disk.is_empty());
}

#[tokio::test]
async fn load_demotes_interrupted_processing_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    let bus = Arc::new(EventBus::new());

    // A run that crashed mid-job leaves a Processing record behind.
    {
        let queue = JobQueue::new(QueueStore::new(&path), bus.clone());
        let job = queue.enqueue(JobType::Text, "G0 X1").await.unwrap();
        queue.mark_processing(&job.id).await.unwrap();
    }

    let queue = JobQueue::new(QueueStore::new(&path), bus);
    queue.load().await.unwrap();

    let jobs = queue.get_all();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Pending);
    assert!(jobs[0].processing_start_time.is_none());
}

#[tokio::test]
async fn enqueue_rejects_empty_motion_text() {
    let rig = rig(None, Duration::from_millis(50));
    let err = rig
        .queue
        .enqueue(JobType::Text, "; nothing streamable\n\n")
        .await
        .unwrap_err();
    assert!(err.is_config_error());
    assert!(rig.queue.is_empty());
}

#[tokio::test]
async fn out_of_range_mutations_are_rejected() {
    let rig = rig(None, Duration::from_millis(50));
    rig.queue.enqueue(JobType::Text, "G0 X1").await.unwrap();

    assert!(rig.queue.remove_at(5).await.is_err());
    assert!(rig.queue.move_job(0, 3).await.is_err());
    assert!(rig.queue.move_job(2, 0).await.is_err());
    assert_eq!(rig.queue.len(), 1);
}

#[tokio::test]
async fn enqueue_computes_line_stats() {
    let rig = rig(None, Duration::from_millis(50));
    let job = rig
        .queue
        .enqueue(JobType::Pen, "G21\nM3 S90\nG0 X1 Y1\nM3 S0\nM2")
        .await
        .unwrap();

    assert_eq!(job.stats.total_lines, 5);
    assert_eq!(job.stats.actuator_lines, 2);
    assert_eq!(job.stats.device_lines, 3);
}

mod move_property {
    use super::*;
    use proptest::prelude::*;

    /// Reference behavior of `move_job` over plain ids
    fn model_move(ids: &[usize], from: usize, to: usize) -> Vec<usize> {
        let mut out = ids.to_vec();
        let item = out.remove(from);
        out.insert(to, item);
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn move_relocates_exactly_one_item(len in 1usize..8, from_seed in 0usize..8, to_seed in 0usize..8) {
            let from = from_seed % len;
            let to = to_seed % len;

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async move {
                let dir = tempfile::tempdir().unwrap();
                let queue = JobQueue::new(
                    QueueStore::new(dir.path().join("queue.json")),
                    Arc::new(EventBus::new()),
                );

                for i in 0..len {
                    queue.enqueue(JobType::Text, &format!("G0 X{}", i)).await.unwrap();
                }
                let before: Vec<String> =
                    queue.get_all().iter().map(|j| j.id.clone()).collect();

                queue.move_job(from, to).await.unwrap();

                let after: Vec<String> =
                    queue.get_all().iter().map(|j| j.id.clone()).collect();
                let expected_order = model_move(
                    &(0..len).collect::<Vec<_>>(),
                    from,
                    to,
                );
                let expected: Vec<String> = expected_order
                    .iter()
                    .map(|&i| before[i].clone())
                    .collect();

                assert_eq!(after, expected);
            });
        }
    }
}
