//! Adapter between the device-facing transport, the operator API and the
//! reconciler.
//!
//! Deliberately thin: envelope unwrapping and the unknown-device policy
//! live here, every merge decision stays in the reconciler.

mod adapter;

pub use adapter::*;


use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::AttributeMap;
use crate::Result;

/// External device registry lookup. The engine never writes to it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceRegistry: Send + Sync + 'static {
    async fn is_registered(
        &self,
        device_id: &str,
    ) -> Result<bool>;
}

/// Registry stub for deployments without an external registry: every
/// device id is acceptable and shadows are created on first write.
pub struct AllowAllRegistry;

#[async_trait]
impl DeviceRegistry for AllowAllRegistry {
    async fn is_registered(
        &self,
        _device_id: &str,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// What to do with a write for a device id the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownDevicePolicy {
    /// Create the shadow anyway (the reconciler happily does)
    #[default]
    AcceptAndCreate,
    /// Surface `DeviceUnknown` to the sender
    Reject,
}

/// One inbound message from the device-facing pub/sub transport, already
/// stripped to the fields the engine cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEnvelope {
    pub device_id: String,
    pub attributes: AttributeMap,
}
