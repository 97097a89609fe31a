//! # Event Bus Module
//!
//! Publish/subscribe distribution of control-plane events:
//! - Publishers emit typed events without knowing subscribers
//! - Subscribers filter and receive events of interest
//! - Supports both sync handlers and async broadcast receivers
//!
//! The bus is constructed once by the orchestration context and injected
//! into each component; nothing here is process-global.

mod bus;
mod events;

pub use bus::*;
pub use events::*;
