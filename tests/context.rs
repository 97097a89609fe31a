//! Context wiring smoke tests (no hardware attached)

use plotkit::{Config, JobType, PlotterContext};

fn offline_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.devices.motion.enabled = false;
    config.devices.panel.enabled = false;
    config.devices.remote.enabled = false;
    config.devices.motion.port = "/dev/ttyUSB0".to_string();
    config.devices.panel.port = "/dev/ttyACM0".to_string();
    config.devices.remote.port = "/dev/ttyACM1".to_string();
    config.queue.path = dir.path().join("queue.json");
    config
}

#[tokio::test]
async fn context_wires_up_and_accepts_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let context = PlotterContext::new(offline_config(&dir)).await.unwrap();

    let job = context
        .queue()
        .enqueue(JobType::Text, "G21\nG0 X1 Y1\nM2")
        .await
        .unwrap();
    assert_eq!(context.queue().len(), 1);
    assert_eq!(job.stats.total_lines, 3);

    // Queue mutations show up in the activity log via the bus bridge.
    assert!(!context.activity().is_empty());
}

#[tokio::test]
async fn context_restores_persisted_queue() {
    let dir = tempfile::tempdir().unwrap();

    {
        let context = PlotterContext::new(offline_config(&dir)).await.unwrap();
        context
            .queue()
            .enqueue(JobType::Image, "G0 X5\nM2")
            .await
            .unwrap();
    }

    let context = PlotterContext::new(offline_config(&dir)).await.unwrap();
    assert_eq!(context.queue().len(), 1);
}

#[tokio::test]
async fn shared_secret_gate() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = offline_config(&dir);
    config.auth.shared_secret = "hunter2".to_string();

    let context = PlotterContext::new(config).await.unwrap();
    assert!(context.authorize("hunter2").is_ok());
    assert!(context.authorize("nope").is_err());
}
