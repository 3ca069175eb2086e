use serde::Deserialize;
use serde::Serialize;

/// Prometheus exporter settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Whether the metrics HTTP endpoint is served at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Port for the `/metrics` scrape endpoint
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_prometheus_port() -> u16 {
    9464
}
