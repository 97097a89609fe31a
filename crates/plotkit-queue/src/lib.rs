//! # Plotkit Queue
//!
//! Persisted ordered job queue and the single-flight processor that
//! drives queued jobs through the transmission engine.

pub mod processor;
pub mod queue;
pub mod store;

pub use processor::{ProcessingReport, QueueProcessor};
pub use queue::JobQueue;
pub use store::{QueueStore, QUEUE_FILE_VERSION};
