//! Panel mode write-back seam
//!
//! The engine restores the panel to ready mode when a transmission ends.
//! Mode tokens are single, unacknowledged, idempotent commands, so they
//! are written lock-free outside the transmission gate.

use async_trait::async_trait;
use plotkit_core::{DeviceType, Result};
use plotkit_devices::DeviceLinkProvider;
use std::sync::Arc;

/// Write-back channel for panel mode tokens
#[async_trait]
pub trait PanelPort: Send + Sync {
    /// Write one mode token to the panel
    async fn write_token(&self, token: &str) -> Result<()>;
}

/// Panel port writing through the connection manager's panel link
///
/// A missing link is tolerated: mode restoration degrades to a log line
/// when the panel is unplugged.
pub struct LinkPanelPort {
    provider: Arc<dyn DeviceLinkProvider>,
}

impl LinkPanelPort {
    /// Create a panel port over the given provider
    pub fn new(provider: Arc<dyn DeviceLinkProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PanelPort for LinkPanelPort {
    async fn write_token(&self, token: &str) -> Result<()> {
        match self.provider.link(DeviceType::Panel) {
            Some(link) => link.write_line(token).await,
            None => {
                tracing::debug!("Panel token '{}' skipped: panel not connected", token);
                Ok(())
            }
        }
    }
}

/// Panel port that discards tokens; for headless operation
pub struct NoOpPanelPort;

#[async_trait]
impl PanelPort for NoOpPanelPort {
    async fn write_token(&self, _token: &str) -> Result<()> {
        Ok(())
    }
}
