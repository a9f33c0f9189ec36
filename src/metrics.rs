use crate::{ArtifactKind, SnapshotError};
use ::metrics::{histogram, increment_counter};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

// Without an installed recorder these are no-ops.

pub fn record_capture_session(duration: Duration, success: bool) {
    if success {
        increment_counter!("snapshot_capture_sessions_total");
    } else {
        increment_counter!("snapshot_capture_sessions_failed_total");
    }
    histogram!("snapshot_capture_session_seconds", duration.as_secs_f64());
}

pub fn record_quota_retry() {
    increment_counter!("snapshot_quota_retries_total");
}

pub fn record_sink_failure(kind: ArtifactKind) {
    increment_counter!("snapshot_sink_failures_total", "kind" => kind.label());
}

pub fn record_trigger(trigger: &'static str) {
    increment_counter!("snapshot_triggers_total", "trigger" => trigger);
}

/// Serves the Prometheus scrape endpoint on `addr`. Must be called from
/// within a tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), SnapshotError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SnapshotError::ConfigurationError(e.to_string()))?;

    info!("Prometheus metrics exporter listening on {}", addr);
    Ok(())
}
