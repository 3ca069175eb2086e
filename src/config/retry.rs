use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means no retry)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    /// Exponential delay for the given zero-based attempt, capped at
    /// `max_delay_ms`.
    pub fn delay(&self, attempt: usize) -> Duration {
        let exp = attempt.min(31) as u32;
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(raw.min(self.max_delay_ms))
    }

    /// Capped exponential delay plus up to 50% random jitter, so a fleet of
    /// reconnecting clients does not stampede the server.
    pub fn delay_with_jitter(&self, attempt: usize) -> Duration {
        let base = self.delay(attempt);
        let jitter_ms = if base.as_millis() == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2)
        };
        base + Duration::from_millis(jitter_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Divide strategies by business domain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Conditional-write race strategy (read-merge-write cycle)
    #[serde(default)]
    pub reconcile: BackoffPolicy,

    // Transient storage failure strategy
    #[serde(default)]
    pub storage: BackoffPolicy,

    // Client reconnect strategy (reference stream client)
    #[serde(default)]
    pub reconnect: BackoffPolicy,
}

// Default value implementation
impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            reconcile: BackoffPolicy {
                max_retries: 3,
                timeout_ms: 100,
                base_delay_ms: 5,
                max_delay_ms: 100,
            },
            storage: BackoffPolicy {
                max_retries: 3,
                timeout_ms: 500,
                base_delay_ms: 50,
                max_delay_ms: 1000,
            },
            reconnect: BackoffPolicy {
                max_retries: 20,
                timeout_ms: 5000,
                base_delay_ms: 1000,
                max_delay_ms: 30000,
            },
        }
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
