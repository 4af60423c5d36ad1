//! Application startup and lifecycle management.
//!
//! The listener is bound before the store is reached; the connector then
//! connects in the background and the readiness gate keeps the data routes
//! closed until it succeeds.

use crate::config::{MapConfig, StoreBackend};
use crate::handlers;
use crate::middleware::require_store_ready;
use crate::services::{
    ConnectorSettings, MapCollection, MemoryDriver, MongoDriver, StoreConnector, StoreDriver,
};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: MapConfig,
    pub connector: Arc<StoreConnector>,
    pub collection: MapCollection,
}

impl AppState {
    pub fn new(config: MapConfig, driver: Arc<dyn StoreDriver>) -> Self {
        let connector = StoreConnector::new(
            driver,
            ConnectorSettings {
                retry_delay: config.store.retry_delay(),
                heartbeat_interval: config.store.heartbeat_interval(),
            },
        );
        Self {
            config,
            collection: MapCollection::new(connector.clone()),
            connector,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let data_routes: Router<AppState> = Router::new()
        .route("/api/getMapData", get(handlers::get_map_data))
        .route("/api/saveMapData", post(handlers::save_map_data))
        .route("/api/clearMapData", delete(handlers::clear_map_data))
        .route_layer(middleware::from_fn_with_state(
            state.connector.clone(),
            require_store_ready,
        ));

    Router::new()
        .route("/api/test", get(handlers::test_connection))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .merge(data_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Picks the store backend named in the configuration.
pub fn driver_for(config: &MapConfig) -> Arc<dyn StoreDriver> {
    match config.store.backend {
        StoreBackend::Mongodb => Arc::new(MongoDriver::new(config.mongodb.clone())),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store backend; data is lost on restart");
            Arc::new(MemoryDriver::new())
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: MapConfig) -> Result<Self, AppError> {
        let driver = driver_for(&config);
        Self::build_with_driver(config, driver).await
    }

    /// Build the application against an explicit store driver.
    pub async fn build_with_driver(
        config: MapConfig,
        driver: Arc<dyn StoreDriver>,
    ) -> Result<Self, AppError> {
        let state = AppState::new(config.clone(), driver);

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connector(&self) -> &Arc<StoreConnector> {
        &self.state.connector
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests and close
    /// the store connection.
    pub async fn run_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let connector = self.state.connector.clone();
        connector.start().await;

        tracing::info!(
            port = self.port,
            routes = "GET /api/test, GET /api/getMapData, POST /api/saveMapData, DELETE /api/clearMapData",
            "map-service listening"
        );

        let router = build_router(self.state);
        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(signal)
            .await;

        if let Err(e) = &result {
            tracing::error!("HTTP server error: {}", e);
        }

        connector.shutdown().await;
        tracing::info!("Service stopped");
        result
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, shutting down gracefully");
}
