use autometrics::prometheus_exporter::{self, PrometheusResponse};
use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use tokio::sync::watch;
use warp::{Filter, Rejection, Reply};

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref SHADOW_WRITES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("shadow_writes_total", "Accepted shadow writes by state kind"),
        &["kind"]
    )
    .expect("Should succeed to create metric");

    pub static ref WRITE_CONFLICTS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "shadow_write_conflicts_total",
            "Conditional writes lost to a concurrent writer, by outcome"
        ),
        &["outcome"]
    )
    .expect("Should succeed to create metric");

    pub static ref VALIDATION_FAILURES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "shadow_validation_failures_total",
            "Deltas rejected by attribute validation"
        ),
        &["kind"]
    )
    .expect("Should succeed to create metric");

    pub static ref CHANGE_EVENTS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "change_events_total",
            "Change events by notifier disposition"
        ),
        &["disposition"]
    )
    .expect("Should succeed to create metric");

    pub static ref FANOUT_DELIVERIES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "fanout_deliveries_total",
            "Per-connection event deliveries by outcome"
        ),
        &["outcome"]
    )
    .expect("Should succeed to create metric");

    pub static ref ACTIVE_CONNECTIONS_METRIC: IntGauge = IntGauge::new(
        "active_connections",
        "Currently open subscriber connections"
    )
    .expect("Should succeed to create metric");

    pub static ref ACTIVE_SUBSCRIPTIONS_METRIC: IntGauge = IntGauge::new(
        "active_subscriptions",
        "Currently live (connection, device) subscription pairs"
    )
    .expect("Should succeed to create metric");

    pub static ref REGISTRY: Registry = Registry::new();
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(SHADOW_WRITES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WRITE_CONFLICTS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(VALIDATION_FAILURES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CHANGE_EVENTS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FANOUT_DELIVERIES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_CONNECTIONS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_SUBSCRIPTIONS_METRIC.clone()))
        .expect("collector can be registered");
}

pub async fn start_server(port: u16, mut shutdown_signal: watch::Receiver<()>) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        eprintln!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    res.push_str(&get_metrics_body());
    Ok(res)
}

/// Export metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    let autometrics_response = prometheus_exporter::encode_http_response();
    autometrics_response.into_body()
}

/// Export metrics for Prometheus to scrape
pub fn get_metrics() -> PrometheusResponse {
    prometheus_exporter::encode_http_response()
}
