//! Names of the metrics and the initialization of the Prometheus exporter.
use super::GLOBAL_LABELS;
use crate::config::from_env_or_panic;
use serde::Deserialize;

/// Histogram buckets to measure the distribution of request durations in seconds
const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Number of transport send attempts per channel, labeled by `kind` and
/// `result` (`ok`, `err`, `timeout`, `panic`).
pub(crate) const SENDS_TOTAL: &str = "sportcast_sends_total";

/// Duration of a whole channel send including the retries, labeled by `kind`
pub(crate) const SEND_DURATION_SECONDS: &str = "sportcast_send_duration_seconds";

/// Channels denied by the spam gate, labeled by `kind`
pub(crate) const GATE_BLOCKED_TOTAL: &str = "sportcast_gate_blocked_total";

/// Resolved images, labeled by `origin`
pub(crate) const IMAGE_RESOLUTIONS_TOTAL: &str = "sportcast_image_resolutions_total";

/// Finished distributions, labeled by `kind` and `status`
pub(crate) const DISTRIBUTIONS_TOTAL: &str = "sportcast_distributions_total";

/// Duration of a single real http request. If there were retries, then these
/// will appear as as separate observations.
pub(crate) const HTTP_REQUEST_DURATION_SECONDS: &str = "sportcast_http_request_duration_seconds";

#[derive(Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    port: u16,
}

fn default_metrics_port() -> u16 {
    2000
}

pub fn init_metrics() {
    let config: MetricsConfig = from_env_or_panic("METRICS_");

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .set_buckets(DEFAULT_DURATION_BUCKETS)
        .unwrap_or_else(|err| panic!("BUG: invalid default histogram buckets: {err}"));

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .unwrap_or_else(|err| panic!("Failed to initialize the metrics listener: {err}"));

    describe();
}

fn describe() {
    metrics::describe_counter!(SENDS_TOTAL, "Number of transport send attempts per channel");
    metrics::describe_histogram!(
        SEND_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Duration of a channel send including the retries"
    );
    metrics::describe_counter!(GATE_BLOCKED_TOTAL, "Channels denied by the spam gate");
    metrics::describe_counter!(IMAGE_RESOLUTIONS_TOTAL, "Resolved images by their origin");
    metrics::describe_counter!(DISTRIBUTIONS_TOTAL, "Finished distributions by status");
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Duration of a single HTTP request"
    );
}
