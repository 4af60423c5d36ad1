//! Metrics collection for map-service.
//!
//! Counters are recorded through the `metrics` facade and rendered in
//! Prometheus text format by the installed exporter.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Call once at process start.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| AppError::InternalError(anyhow::anyhow!("metrics already initialized")))?;

    metrics::describe_counter!(
        "store_connect_attempts_total",
        "Store connection attempts by outcome"
    );
    metrics::describe_counter!(
        "store_connection_lost_total",
        "Ready store connections that stopped answering pings"
    );
    metrics::describe_counter!(
        "map_data_operations_total",
        "Collection operations by operation and outcome"
    );

    Ok(())
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_connect_attempt(outcome: &'static str) {
    metrics::counter!("store_connect_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_connection_lost() {
    metrics::counter!("store_connection_lost_total").increment(1);
}

pub fn record_operation(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "map_data_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}
