//! Local pen-lift actuator
//!
//! Single-axis actuator controlled by the host directly, bypassing the
//! motion controller. The transmission engine routes intercepted
//! spindle-parameter lines here; the angle is already clamped to
//! [0, 180] by the time it arrives.

use crate::link::DeviceLinkProvider;
use async_trait::async_trait;
use plotkit_core::{DeviceType, Result};
use std::sync::Arc;

/// Pen-lift actuator interface
#[async_trait]
pub trait LocalActuator: Send + Sync {
    /// Move the actuator to the given angle (degrees, 0..=180)
    async fn set_angle(&self, angle: u8) -> Result<()>;
}

/// Actuator driven through the auxiliary controller link
///
/// Writes `S<angle>` to the remote port. Missing link is tolerated as a
/// warning: the stream keeps best-effort continuation past a detached
/// actuator, mirroring the policy for protocol errors.
pub struct LinkPenLift {
    provider: Arc<dyn DeviceLinkProvider>,
}

impl LinkPenLift {
    /// Create an actuator writing through the given provider
    pub fn new(provider: Arc<dyn DeviceLinkProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl LocalActuator for LinkPenLift {
    async fn set_angle(&self, angle: u8) -> Result<()> {
        match self.provider.link(DeviceType::Remote) {
            Some(link) => link.write_line(&format!("S{}", angle.min(180))).await,
            None => {
                tracing::warn!("Pen lift to {}° skipped: actuator port not connected", angle);
                Ok(())
            }
        }
    }
}

/// Actuator that does nothing; for machines without a pen lift
pub struct NoOpActuator;

#[async_trait]
impl LocalActuator for NoOpActuator {
    async fn set_angle(&self, _angle: u8) -> Result<()> {
        Ok(())
    }
}
