//! Device link abstraction
//!
//! A link is a handle to one open line-delimited connection. Incoming
//! bytes are split into lines and fanned out over a broadcast channel,
//! so any number of consumers (ack waiter, connection watcher, panel
//! reader) can observe the same stream. Writes go through the link
//! directly and are newline-terminated.

use async_trait::async_trait;
use plotkit_core::{DeviceType, Result};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Handle to one open device connection
///
/// Owned exclusively by its opener (the Connection Manager in the
/// production wiring); at most one open link per device type per role.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Device class this link serves
    fn device_type(&self) -> DeviceType;

    /// Port path the link was opened on
    fn path(&self) -> &str;

    /// Whether the link is still open
    fn is_open(&self) -> bool;

    /// Write one line, newline-terminated, to the device
    async fn write_line(&self, line: &str) -> Result<()>;

    /// Subscribe to the incoming line stream
    ///
    /// The receiver only observes lines arriving after subscription.
    fn subscribe_lines(&self) -> broadcast::Receiver<String>;

    /// Close the link; further writes fail
    async fn close(&self) -> Result<()>;
}

/// Read access to the currently open links, one per device type
///
/// The narrow seam between the Connection Manager and the components
/// that stream through its links.
pub trait DeviceLinkProvider: Send + Sync {
    /// The open link for a device type, if any
    fn link(&self, device: DeviceType) -> Option<Arc<dyn DeviceLink>>;
}

/// Connector for one device type
///
/// The Connection Manager drives adapters; production adapters open
/// serial ports, test adapters hand out scripted links.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Open a link on the given port
    async fn connect(&self, port: &str) -> Result<Arc<dyn DeviceLink>>;

    /// Tear a link down
    async fn disconnect(&self, link: &Arc<dyn DeviceLink>) -> Result<()>;
}
