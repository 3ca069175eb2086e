use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_NOTIFIER_SHARDS;
use crate::constants::DEFAULT_SHARD_BUFFER;
use crate::Error;
use crate::Result;
use crate::UnknownDevicePolicy;

/// Core reconciliation and fanout parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Root directory for the embedded shadow database
    #[serde(default = "default_db_root_dir")]
    pub db_root_dir: PathBuf,

    /// Directory for the rolling engine log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Bound on read-merge-write retries when a conditional write loses a
    /// version race. Validation failures are never retried.
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: usize,

    /// Number of notifier shards; per-device ordering holds within a shard
    #[serde(default = "default_notifier_shards")]
    pub notifier_shards: usize,

    /// Depth of each shard channel between reconciler and dispatch loop
    #[serde(default = "default_shard_buffer")]
    pub shard_buffer: usize,

    /// Whether writes for device ids the registry does not know create a
    /// shadow or are rejected
    #[serde(default)]
    pub unknown_device_policy: UnknownDevicePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_root_dir: default_db_root_dir(),
            log_dir: default_log_dir(),
            max_write_retries: default_max_write_retries(),
            notifier_shards: default_notifier_shards(),
            shard_buffer: default_shard_buffer(),
            unknown_device_policy: UnknownDevicePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.notifier_shards == 0 {
            return Err(Error::Config(ConfigError::Message(
                "engine.notifier_shards must be at least 1".to_string(),
            )));
        }
        if self.shard_buffer == 0 {
            return Err(Error::Config(ConfigError::Message(
                "engine.shard_buffer must be at least 1".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_db_root_dir() -> PathBuf {
    PathBuf::from("./shadow_data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_max_write_retries() -> usize {
    3
}

fn default_notifier_shards() -> usize {
    DEFAULT_NOTIFIER_SHARDS
}

fn default_shard_buffer() -> usize {
    DEFAULT_SHARD_BUFFER
}
