use std::net::SocketAddr;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_HEARTBEAT_INTERVAL_MS;
use crate::constants::DEFAULT_OUTBOUND_BUFFER;
use crate::Error;
use crate::Result;

/// Listener and per-connection delivery parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Address the HTTP/WebSocket server binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Heartbeat (ping) interval in milliseconds. A peer silent for twice
    /// this interval is treated as a zombie and force-closed.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Per-connection outbound buffer depth. When full, buffered events for
    /// a device are abandoned in favor of a single resync frame.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Shared bearer token expected on the `token` connection parameter.
    /// `None` disables the check (development only).
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            outbound_buffer: default_outbound_buffer(),
            auth_token: None,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network.heartbeat_interval_ms must be greater than zero".to_string(),
            )));
        }
        if self.outbound_buffer == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network.outbound_buffer must be at least 1".to_string(),
            )));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence deadline after which a peer is presumed dead.
    pub fn zombie_deadline(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms * 2)
    }
}

fn default_listen_address() -> SocketAddr {
    "127.0.0.1:9075".parse().expect("valid default listen address")
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_outbound_buffer() -> usize {
    DEFAULT_OUTBOUND_BUFFER
}
