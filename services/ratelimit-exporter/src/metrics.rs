//! Exporter self-metrics
//!
//! Emitted through the `metrics` facade by the monitoring core and rendered
//! after the rate-limit snapshot on `/metrics`:
//!
//! - `ratelimit_exporter_refresh_cycles_total` (counter)
//! - `ratelimit_exporter_refresh_duration_seconds` (histogram)
//! - `ratelimit_exporter_token_renewals_total` (counter): label `outcome`
//! - `ratelimit_exporter_probe_results_total` (counter): label `result`
//! - `ratelimit_exporter_last_refresh_timestamp_seconds` (gauge)

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REFRESH_DURATION_METRIC: &str = "ratelimit_exporter_refresh_duration_seconds";

/// A pass makes up to three sequential requests per account, each bounded by
/// the registry timeout.
const REFRESH_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(REFRESH_DURATION_METRIC.to_string()),
        REFRESH_DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// The refresh duration is bucketed so it renders as a histogram rather than
/// the default summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = builder()?.install_recorder()?;
    describe();
    Ok(handle)
}

/// Register HELP text for every self-metric.
fn describe() {
    metrics::describe_counter!(
        "ratelimit_exporter_refresh_cycles_total",
        "Completed refresh passes over all accounts"
    );
    metrics::describe_histogram!(
        REFRESH_DURATION_METRIC,
        metrics::Unit::Seconds,
        "Wall time of one refresh pass"
    );
    metrics::describe_counter!(
        "ratelimit_exporter_token_renewals_total",
        "Bearer token renewals by outcome"
    );
    metrics::describe_counter!(
        "ratelimit_exporter_probe_results_total",
        "Per-account probe results by kind"
    );
    metrics::describe_gauge!(
        "ratelimit_exporter_last_refresh_timestamp_seconds",
        metrics::Unit::Seconds,
        "Unix time at which the published snapshot was rendered"
    );
}
