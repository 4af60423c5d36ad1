use map_service::config::MapConfig;
use map_service::services::init_metrics;
use map_service::startup::Application;
use service_core::observability::{init_tracing, install_panic_hook};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = MapConfig::load();

    let (log_level, otlp_endpoint) = match &config {
        Ok(config) => (
            config.observability.log_level.clone(),
            config.observability.otlp_endpoint.clone(),
        ),
        Err(_) => ("info".to_string(), None),
    };
    init_tracing("map-service", &log_level, otlp_endpoint.as_deref());
    install_panic_hook();

    let config = config.map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_metrics().map_err(|e| {
        tracing::error!("Failed to initialize metrics: {}", e);
        std::io::Error::other(format!("Metrics error: {}", e))
    })?;

    tracing::info!(
        uri = %map_service::services::store::mongo::redact_uri(&config.mongodb.uri),
        database = %config.mongodb.database,
        collection = %config.mongodb.collection,
        "Starting map-service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
