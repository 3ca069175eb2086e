use serde::Deserialize;
use serde::Serialize;

use super::AttributeMap;
use super::PendingDelta;

/// One accepted reconciliation, shaped for incremental application by
/// subscribers. Carries changed keys only; a subscriber that lost events
/// re-fetches the full document instead of replaying.
///
/// Ephemeral: never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub device_id: String,

    /// Version assigned by the accepted write
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_delta: Option<AttributeMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_delta: Option<AttributeMap>,

    #[serde(default, skip_serializing_if = "PendingDelta::is_empty")]
    pub pending_delta: PendingDelta,

    /// Epoch milliseconds of the write
    pub timestamp: u64,
}
