//! Configuration management module for the shadow engine.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Main config file (`config/shadow.toml`)
//! 3. Explicit override file (CLI / builder supplied)
//! 4. `CONFIG_PATH` environment override
//! 5. Environment variables with the `SHADOW` prefix (highest priority)

mod engine;
mod monitoring;
mod network;
mod retry;
mod validation;

pub use engine::*;
pub use monitoring::*;
pub use network::*;
pub use retry::*;
pub use validation::*;

#[cfg(test)]
mod config_test;

//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Reconciler and notifier parameters
    #[serde(default)]
    pub engine: EngineConfig,

    /// Listener, heartbeat and delivery parameters
    #[serde(default)]
    pub network: NetworkConfig,

    /// Attribute schemas and equality rules
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Retry policies for storage, reconciliation and reconnect
    #[serde(default)]
    pub retry: RetryPolicies,

    /// Metrics exporter settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load configuration with proper priority ordering.
    ///
    /// # Arguments
    /// * `override_path` - Optional path to a deployment-specific config file
    pub fn load(override_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/shadow").required(false));

        if let Some(path) = override_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path));
        }

        // Environment variables (highest priority)
        builder = builder.add_source(
            Environment::with_prefix("SHADOW")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Cross-section sanity checks, run once after loading.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.network.validate()?;
        self.validation.validate()?;
        Ok(())
    }
}
