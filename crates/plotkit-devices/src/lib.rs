//! # Plotkit Devices
//!
//! Physical device plumbing for the Plotkit control plane:
//! - Line-delimited device links over serial ports
//! - Auto-connect/reconnect lifecycle per device type with backoff
//! - Listener lifecycle guard over line-stream subscriptions
//! - The local pen-lift actuator
//! - Scripted test doubles for hardware-free tests

pub mod actuator;
pub mod link;
pub mod listener;
pub mod manager;
pub mod serial;
pub mod testing;

pub use actuator::{LinkPenLift, LocalActuator, NoOpActuator};
pub use link::{DeviceAdapter, DeviceLink, DeviceLinkProvider};
pub use listener::{ListenerGuard, ListenerGuardConfig, ListenerHandle};
pub use manager::{ConnectionManager, ReconnectPolicy};
pub use serial::{
    list_ports, SerialDeviceAdapter, SerialLink, SerialLinkParams, SerialParity, SerialPortInfo,
};
