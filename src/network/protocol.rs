use serde::Deserialize;
use serde::Serialize;

use crate::ChangeEvent;

/// Frames a subscriber may send after the WebSocket upgrade. Text frames
/// carrying JSON; anything else is answered with an error frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { device_id: String },
    Unsubscribe { device_id: String },
}

/// Frames the engine sends to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One accepted shadow change on a subscribed device
    Event {
        #[serde(flatten)]
        event: ChangeEvent,
    },

    /// Periodic liveness probe; no reply is required beyond transport pongs
    Heartbeat { timestamp: u64 },

    /// The connection fell behind on this device and buffered events were
    /// abandoned. The subscriber must re-fetch the full document.
    Resync { device_id: String },

    /// A control frame was malformed or could not be honored
    Error { message: String },
}

impl ServerFrame {
    pub fn event(event: ChangeEvent) -> Self {
        Self::Event { event }
    }
}
