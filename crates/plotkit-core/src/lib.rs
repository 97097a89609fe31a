//! # Plotkit Core
//!
//! Core types and utilities for the Plotkit control plane.
//! Provides the data models, error taxonomy, event bus, and activity
//! log shared by the device, engine, queue, and panel crates.

pub mod activity;
pub mod data;
pub mod error;
pub mod event_bus;

pub use activity::{ActivityEntry, ActivityLog, DEFAULT_ACTIVITY_CAPACITY};

pub use data::{
    ConnectionState, DeviceType, JobStats, JobStatus, JobType, MachineDimensions, MotionJob,
    PanelMode, PanelStatus, Position, TransmissionSummary,
};

pub use error::{ConfigError, EngineError, Error, QueueError, Result, TransportError};

// Re-export event bus for convenience
pub use event_bus::{
    AppEvent, ConnectionEvent, ErrorEvent, EventBus, EventBusConfig, EventCategory, EventFilter,
    PanelEvent, QueueEvent, SubscriptionId, TransmissionEvent,
};
