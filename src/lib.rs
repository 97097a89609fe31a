//! # Plotkit
//!
//! Control plane for a motorized pen-plotting machine: a motion
//! controller speaking a line-oriented command language, an operator
//! panel with its own token protocol, and a local pen-lift actuator.
//!
//! ## Architecture
//!
//! Plotkit is organized as a workspace with multiple crates:
//!
//! 1. **plotkit-core** - data model, error taxonomy, event bus, activity log
//! 2. **plotkit-settings** - configuration files and validation
//! 3. **plotkit-devices** - serial links, connection lifecycle, actuator
//! 4. **plotkit-engine** - motion-command transmission engine
//! 5. **plotkit-queue** - persisted job queue and single-flight processor
//! 6. **plotkit-panel** - panel protocol and operator state machine
//! 7. **plotkit** - main binary wiring everything into one context

pub mod context;

pub use context::PlotterContext;

pub use plotkit_core::{
    ActivityLog, AppEvent, ConnectionEvent, ConnectionState, DeviceType, EngineError, Error,
    EventBus, EventCategory, EventFilter, JobStatus, JobType, MotionJob, PanelEvent, PanelMode,
    PanelStatus, Position, QueueError, QueueEvent, Result, TransmissionEvent, TransmissionSummary,
    TransportError,
};
pub use plotkit_devices::{list_ports, ConnectionManager, ReconnectPolicy, SerialPortInfo};
pub use plotkit_engine::{SendMode, TransmissionEngine};
pub use plotkit_panel::PanelStateMachine;
pub use plotkit_queue::{JobQueue, ProcessingReport, QueueProcessor};
pub use plotkit_settings::Config;

/// Build timestamp embedded by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize tracing with an env-filter defaulting to INFO
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer().with_target(true).with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
