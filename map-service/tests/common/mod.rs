#![allow(dead_code)]

use map_service::config::{MapConfig, StoreBackend};
use map_service::services::{ConnectionState, MemoryDriver, StoreConnector};
use map_service::startup::Application;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub driver: MemoryDriver,
    pub connector: Arc<StoreConnector>,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawn the service on a random port with a reachable in-memory store.
    pub async fn spawn() -> Self {
        Self::spawn_with(MemoryDriver::new(), Duration::from_millis(5000)).await
    }

    /// Spawn the service with the store down and a short retry delay.
    pub async fn spawn_unreachable(retry_delay: Duration) -> Self {
        Self::spawn_with(MemoryDriver::unreachable(), retry_delay).await
    }

    pub async fn spawn_with(driver: MemoryDriver, retry_delay: Duration) -> Self {
        let mut config = MapConfig::for_local(0);
        config.store.backend = StoreBackend::Memory;
        config.store.retry_delay_ms = retry_delay.as_millis() as u64;

        let app = Application::build_with_driver(config, Arc::new(driver.clone()))
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let connector = app.connector().clone();
        let address = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            app.run_until(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            driver,
            connector,
            client,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn wait_for_state(&self, wanted: ConnectionState, within: Duration) {
        let mut rx = self.connector.subscribe();
        tokio::time::timeout(within, rx.wait_for(|state| *state == wanted))
            .await
            .unwrap_or_else(|_| panic!("store did not reach {} in {:?}", wanted, within))
            .expect("state channel closed");
    }

    pub async fn wait_until_ready(&self) {
        self.wait_for_state(ConnectionState::Ready, Duration::from_secs(5))
            .await;
    }

    /// Trigger graceful shutdown and wait for the connector to close.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.wait_for_state(ConnectionState::Disconnected, Duration::from_secs(5))
            .await;
    }
}
