//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use qpu_core::{Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::telemetry(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Count a finished run-quil request by outcome
/// (`hit`, `miss`, `client_error`, `upstream_error`, `internal_error`).
pub fn track_request(outcome: &'static str) {
    metrics::counter!("qpu_requests_total", "outcome" => outcome).increment(1);
}

/// Count a cache operation that failed and was absorbed.
pub fn track_cache_degraded(op: &'static str) {
    metrics::counter!("qpu_cache_degraded_total", "op" => op).increment(1);
}

/// Record how long a provider call took.
pub fn track_forwarder_latency(provider: &str, success: bool, latency_sec: f64) {
    metrics::histogram!(
        "qpu_forwarder_duration_seconds",
        "provider" => provider.to_string(),
        "success" => if success { "true" } else { "false" }
    )
    .record(latency_sec);
}
