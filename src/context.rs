//! Orchestration context
//!
//! Constructs and wires every component of the control plane once, at
//! startup: the event bus, the connection manager and its adapters, the
//! transmission engine, the persisted queue and its processor, and the
//! panel state machine. Components only ever see the narrow interfaces
//! they need; nothing is process-global.

use anyhow::Context as _;
use plotkit_core::{ActivityLog, DeviceType, EventBus, EventFilter, Result};
use plotkit_devices::{
    list_ports, ConnectionManager, DeviceLinkProvider, LinkPenLift, ListenerGuard,
    ListenerGuardConfig, ReconnectPolicy, SerialDeviceAdapter, SerialLinkParams,
};
use plotkit_engine::{EngineConfig, LinkPanelPort, TransmissionEngine};
use plotkit_panel::{EraseParams, PanelConfig, PanelStateMachine, PenDefinition};
use plotkit_queue::{JobQueue, QueueProcessor, QueueStore};
use plotkit_settings::Config;
use std::sync::Arc;
use std::time::Duration;

/// Delay before screenshot mode auto-exits
const SCREENSHOT_EXIT_DELAY: Duration = Duration::from_secs(10);

/// Trailing window for software-echo disambiguation
const ECHO_WINDOW: Duration = Duration::from_secs(2);

/// The wired-up control plane
pub struct PlotterContext {
    config: Config,
    bus: Arc<EventBus>,
    activity: Arc<ActivityLog>,
    guard: ListenerGuard,
    manager: Arc<ConnectionManager>,
    engine: Arc<TransmissionEngine>,
    queue: Arc<JobQueue>,
    processor: Arc<QueueProcessor>,
    panel: Arc<PanelStateMachine>,
}

impl PlotterContext {
    /// Construct and wire all components from a validated configuration
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::new());

        // Everything the bus sees becomes an operator-visible activity line.
        let activity = Arc::new(ActivityLog::new());
        {
            let log = activity.clone();
            bus.subscribe(EventFilter::All, move |event| {
                log.push(event.description());
            });
        }

        let guard = ListenerGuard::new(ListenerGuardConfig::default());

        let manager = Arc::new(ConnectionManager::new(
            bus.clone(),
            ReconnectPolicy {
                base_delay: Duration::from_millis(config.reconnect.base_delay_ms),
                max_delay: Duration::from_millis(config.reconnect.max_delay_ms),
                initial_stagger: Duration::from_millis(config.reconnect.initial_stagger_ms),
            },
        ));

        for device in [DeviceType::Motion, DeviceType::Panel, DeviceType::Remote] {
            let settings = config.devices.for_device(device);
            let port = resolve_port(&settings.port);
            let adapter = Arc::new(SerialDeviceAdapter::new(SerialLinkParams::new(
                device,
                settings.baud_rate,
            )));
            manager.register_device(device, &port, adapter);
            manager.set_enabled(device, settings.enabled)?;
        }

        let provider: Arc<dyn DeviceLinkProvider> = manager.clone();

        let engine = Arc::new(TransmissionEngine::new(
            EngineConfig {
                ack_timeout: Duration::from_millis(config.engine.ack_timeout_ms),
                settle_delay: Duration::from_millis(config.engine.settle_delay_ms),
                max_consecutive_timeouts: config.engine.max_consecutive_timeouts,
                halt_on_error: config.engine.halt_on_error,
            },
            guard.clone(),
            Arc::new(LinkPenLift::new(provider.clone())),
            Arc::new(LinkPanelPort::new(provider.clone())),
            bus.clone(),
        ));

        let queue = Arc::new(JobQueue::new(
            QueueStore::new(&config.queue.path),
            bus.clone(),
        ));
        queue.load().await?;

        let processor = Arc::new(QueueProcessor::new(
            queue.clone(),
            engine.clone(),
            provider.clone(),
            bus.clone(),
        ));

        let panel = Arc::new(PanelStateMachine::new(
            PanelConfig {
                erase: EraseParams {
                    dimensions: config.machine.dimensions,
                    row_spacing_mm: config.machine.erase_row_spacing_mm,
                    feed: config.machine.erase_feed,
                    pen_down_angle: config.machine.pen_down_angle,
                    pen_up_angle: config.machine.pen_up_angle,
                },
                pens: config
                    .pens
                    .iter()
                    .map(|p| PenDefinition {
                        id: p.id,
                        name: p.name.clone(),
                        motion_text: p.motion_text.clone(),
                    })
                    .collect(),
                screenshot_exit_delay: SCREENSHOT_EXIT_DELAY,
                echo_window: ECHO_WINDOW,
            },
            provider,
            engine.clone(),
            queue.clone(),
            processor.clone(),
            bus.clone(),
        ));

        Ok(Self {
            config,
            bus,
            activity,
            guard,
            manager,
            engine,
            queue,
            processor,
            panel,
        })
    }

    /// The event bus, for presentation-layer consumers
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The activity log
    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    /// The connection manager
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// The transmission engine
    pub fn engine(&self) -> &Arc<TransmissionEngine> {
        &self.engine
    }

    /// The persisted job queue
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// The queue processor
    pub fn processor(&self) -> &Arc<QueueProcessor> {
        &self.processor
    }

    /// The panel state machine
    pub fn panel(&self) -> &Arc<PanelStateMachine> {
        &self.panel
    }

    /// The shared-secret gate for remote callers
    pub fn authorize(&self, secret: &str) -> Result<()> {
        self.config.authorize(secret)
    }

    /// Run until interrupted: auto-connect, panel loop, Ctrl-C shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let sweeper = self.guard.spawn_sweeper();
        self.manager.start_auto_connect();
        let panel_task = tokio::spawn(self.panel.clone().run());

        tracing::info!("Plotkit control plane running; press Ctrl-C to exit");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;

        tracing::info!("Shutting down");
        panel_task.abort();
        sweeper.abort();
        self.manager.shutdown().await;
        Ok(())
    }
}

/// Resolve an "Auto" port to the first discovered controller-class port
fn resolve_port(configured: &str) -> String {
    if configured != "Auto" {
        return configured.to_string();
    }
    match list_ports() {
        Ok(ports) if !ports.is_empty() => {
            tracing::info!(
                "Auto-selected port {} ({})",
                ports[0].port_name,
                ports[0].description
            );
            ports[0].port_name.clone()
        }
        Ok(_) => {
            tracing::warn!("No controller-class ports discovered; keeping 'Auto'");
            configured.to_string()
        }
        Err(e) => {
            tracing::warn!("Port discovery failed ({}); keeping 'Auto'", e);
            configured.to_string()
        }
    }
}
