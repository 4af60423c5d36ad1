//! Standalone MongoDB connectivity check using the service configuration.

use map_service::config::MapConfig;
use map_service::services::diagnostics::run_probe;
use service_core::observability::{init_tracing, install_panic_hook};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("mongo-probe", "info", None);
    install_panic_hook();

    let config = match MapConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_probe(&config.mongodb).await {
        Ok(report) => {
            tracing::info!(
                connect_ms = report.connect_time.as_millis() as u64,
                total_ms = report.total_time.as_millis() as u64,
                inserted_id = %report.inserted_id,
                verified = report.read_back.is_some(),
                "MongoDB probe succeeded"
            );
            if let Some((name, message)) = &report.read_back {
                tracing::info!(name = %name, message = %message, "Probe document contents");
            }
            tracing::info!(
                uri = %map_service::services::store::mongo::redact_uri(&config.mongodb.uri),
                database = %config.mongodb.database,
                "Connection OK; the service can use this configuration"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(
                kind = ?e.kind,
                elapsed_ms = e.elapsed.as_millis() as u64,
                error = %e.source,
                "MongoDB probe failed"
            );
            for hint in e.kind.hints() {
                tracing::warn!(hint = %hint, "Suggestion");
            }
            ExitCode::FAILURE
        }
    }
}
