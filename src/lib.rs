mod bridge;
mod client;
mod config;
mod constants;
mod engine;
mod errors;
mod metrics;
mod network;
mod notifier;
mod shadow;
mod storage;
mod subscription;
pub mod utils;

pub use bridge::*;
pub use client::*;
pub use config::*;
pub use constants::CLOSE_CODE_AUTH_FAILURE;
pub use constants::CLOSE_CODE_ZOMBIE;
pub use engine::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use notifier::*;
pub use shadow::*;
pub use storage::*;
pub use subscription::*;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
