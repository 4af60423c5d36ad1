//! Store connection lifecycle.
//!
//! [`StoreConnector`] owns at most one live [`MapStore`] handle and the
//! [`ConnectionState`] describing it. A background supervisor task retries
//! failed connections on a fixed delay and pings the store while ready so
//! a dropped connection is noticed without waiting for a request to fail.
//!
//! ```text
//! Disconnected -> Connecting -> Ready <-> Failed (retry after delay)
//!                                 \
//!                                  shutdown() -> Disconnected (terminal)
//! ```

use crate::services::metrics::{record_connect_attempt, record_connection_lost};
use crate::services::store::{MapStore, StoreDriver};
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// Delay between a failed attempt and the next one.
    pub retry_delay: Duration,
    /// How often a ready connection is pinged.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

pub struct StoreConnector {
    driver: Arc<dyn StoreDriver>,
    settings: ConnectorSettings,
    state: watch::Sender<ConnectionState>,
    handle: RwLock<Option<Arc<dyn MapStore>>>,
    /// Held for the whole of a connect attempt or a liveness check.
    attempt: Mutex<()>,
    retry: Notify,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl StoreConnector {
    pub fn new(driver: Arc<dyn StoreDriver>, settings: ConnectorSettings) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            driver,
            settings,
            state,
            handle: RwLock::new(None),
            attempt: Mutex::new(()),
            retry: Notify::new(),
            shutdown: CancellationToken::new(),
            supervisor: Mutex::new(None),
        })
    }

    /// Spawns the supervisor and the first connection attempt.
    ///
    /// Returns immediately; callers observe progress through
    /// [`is_ready`](Self::is_ready) or [`subscribe`](Self::subscribe).
    pub async fn start(self: &Arc<Self>) {
        if !self.spawn_supervisor().await {
            return;
        }

        tracing::info!(
            store = %self.driver.describe(),
            retry_delay_ms = self.settings.retry_delay.as_millis() as u64,
            "Starting store connector"
        );

        let connector = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are logged and retried by the supervisor.
            let _ = connector.connect().await;
        });
    }

    /// Opens a fresh connection, replacing any existing one.
    ///
    /// On failure the state becomes [`ConnectionState::Failed`] and a retry
    /// is requested. Retries are carried out by the supervisor, so they only
    /// happen once [`start`](Self::start) has run; a request made earlier is
    /// picked up when it does. A call made while another attempt is in
    /// flight waits for that attempt and reports its outcome instead of
    /// starting a second one.
    pub async fn connect(&self) -> Result<(), AppError> {
        if self.shutdown.is_cancelled() {
            return Err(shut_down_error());
        }

        let _attempt = match self.attempt.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Connect already in flight, waiting for its outcome");
                let _in_flight = self.attempt.lock().await;
                return self.readiness();
            }
        };
        // A shutdown may have finished between the first check and the lock.
        if self.shutdown.is_cancelled() {
            return Err(shut_down_error());
        }

        self.release_handle().await;
        self.state.send_replace(ConnectionState::Connecting);
        tracing::info!(store = %self.driver.describe(), "Connecting to store");

        match self.open_prepared().await {
            Ok(handle) => {
                if self.shutdown.is_cancelled() {
                    handle.close().await;
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(shut_down_error());
                }

                *self.handle.write().await = Some(handle);
                self.state.send_replace(ConnectionState::Ready);
                record_connect_attempt("success");
                tracing::info!(store = %self.driver.describe(), "Store connection ready");
                Ok(())
            }
            Err(e) => {
                if self.shutdown.is_cancelled() {
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(e);
                }

                self.state.send_replace(ConnectionState::Failed);
                record_connect_attempt("failure");
                tracing::error!(
                    store = %self.driver.describe(),
                    error = %e,
                    retry_in_ms = self.settings.retry_delay.as_millis() as u64,
                    "Store connection failed"
                );
                self.retry.notify_one();
                Err(e)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == ConnectionState::Ready
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The current handle, cloned out so no lock is held across store calls.
    pub async fn live_handle(&self) -> Result<Arc<dyn MapStore>, AppError> {
        if !self.is_ready() {
            return Err(not_ready_error());
        }
        self.handle.read().await.clone().ok_or_else(not_ready_error)
    }

    /// Stops retries, closes the live handle and moves to
    /// [`ConnectionState::Disconnected`] for good. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let supervisor = self.supervisor.lock().await.take();
        if let Some(task) = supervisor {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Store supervisor panicked");
                }
            }
        }

        let _attempt = self.attempt.lock().await;
        self.release_handle().await;
        if self.state.send_replace(ConnectionState::Disconnected) != ConnectionState::Disconnected
        {
            tracing::info!("Store connector shut down");
        }
    }

    /// Returns whether a new supervisor was spawned.
    async fn spawn_supervisor(self: &Arc<Self>) -> bool {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_some() || self.shutdown.is_cancelled() {
            return false;
        }
        *supervisor = Some(tokio::spawn(Arc::clone(self).supervise()));
        true
    }

    async fn open_prepared(&self) -> Result<Arc<dyn MapStore>, AppError> {
        let handle = self.driver.open().await?;
        if let Err(e) = handle.ensure_collection().await {
            handle.close().await;
            return Err(e);
        }
        Ok(handle)
    }

    async fn release_handle(&self) {
        let previous = self.handle.write().await.take();
        if let Some(previous) = previous {
            previous.close().await;
        }
    }

    fn readiness(&self) -> Result<(), AppError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(not_ready_error())
        }
    }

    async fn supervise(self: Arc<Self>) {
        let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        heartbeat.tick().await;

        'supervise: loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break 'supervise,
                _ = self.retry.notified() => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break 'supervise,
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    }
                    if !self.is_ready() {
                        tracing::info!("Retrying store connection");
                        let _ = self.connect().await;
                    }
                }
                _ = heartbeat.tick() => self.check_liveness().await,
            }
        }

        tracing::debug!("Store supervisor stopped");
    }

    async fn check_liveness(&self) {
        if !self.is_ready() {
            return;
        }
        let Ok(_attempt) = self.attempt.try_lock() else {
            return;
        };
        let Some(handle) = self.handle.read().await.clone() else {
            return;
        };

        if let Err(e) = handle.ping().await {
            if self.shutdown.is_cancelled() {
                return;
            }
            tracing::warn!(error = %e, "Store connection lost");
            record_connection_lost();
            self.release_handle().await;
            self.state.send_replace(ConnectionState::Failed);
            self.retry.notify_one();
        }
    }
}

fn not_ready_error() -> AppError {
    AppError::ServiceUnavailable("Database connection not ready".to_string())
}

fn shut_down_error() -> AppError {
    AppError::ServiceUnavailable("Store connector has been shut down".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryDriver;
    use mongodb::bson::doc;

    fn settings() -> ConnectorSettings {
        ConnectorSettings {
            retry_delay: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_secs(60),
        }
    }

    async fn wait_for_state(connector: &StoreConnector, wanted: ConnectionState) {
        let mut rx = connector.subscribe();
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state transition timed out")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn connect_reaches_ready_and_creates_collection() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        assert_eq!(connector.state(), ConnectionState::Disconnected);
        connector.connect().await.unwrap();

        assert!(connector.is_ready());
        assert!(driver.collection_created());
        assert!(connector.live_handle().await.is_ok());
    }

    #[tokio::test]
    async fn failed_connect_reports_failure_and_gates_handle() {
        let driver = MemoryDriver::unreachable();
        let connector = StoreConnector::new(Arc::new(driver), settings());

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
        assert_eq!(connector.state(), ConnectionState::Failed);
        assert!(matches!(
            connector.live_handle().await,
            Err(AppError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn reconnect_closes_the_previous_handle() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.connect().await.unwrap();
        let first = connector.live_handle().await.unwrap();
        connector.connect().await.unwrap();

        assert!(first.ping().await.is_err(), "old handle should be closed");
        assert!(connector.live_handle().await.unwrap().ping().await.is_ok());
        assert_eq!(driver.open_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_after_fixed_delay_until_store_is_reachable() {
        let driver = MemoryDriver::unreachable();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.start().await;
        wait_for_state(&connector, ConnectionState::Failed).await;
        assert_eq!(driver.open_attempts(), 1);

        driver.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(!connector.is_ready(), "retry must wait for the full delay");
        assert_eq!(driver.open_attempts(), 1);

        wait_for_state(&connector, ConnectionState::Ready).await;
        assert_eq!(driver.open_attempts(), 2);

        connector.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_retrying_while_store_stays_down() {
        let driver = MemoryDriver::unreachable();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.start().await;
        tokio::time::sleep(Duration::from_millis(15_500)).await;

        assert_eq!(driver.open_attempts(), 4);
        assert_eq!(connector.state(), ConnectionState::Failed);

        connector.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_detects_lost_connection_and_recovers() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(
            Arc::new(driver.clone()),
            ConnectorSettings {
                retry_delay: Duration::from_millis(5000),
                heartbeat_interval: Duration::from_secs(1),
            },
        );

        connector.start().await;
        wait_for_state(&connector, ConnectionState::Ready).await;

        driver.set_reachable(false);
        wait_for_state(&connector, ConnectionState::Failed).await;
        assert!(connector.live_handle().await.is_err());

        driver.set_reachable(true);
        wait_for_state(&connector, ConnectionState::Ready).await;

        connector.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_retry() {
        let driver = MemoryDriver::unreachable();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.start().await;
        wait_for_state(&connector, ConnectionState::Failed).await;

        connector.shutdown().await;
        assert_eq!(connector.state(), ConnectionState::Disconnected);

        driver.set_reachable(true);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(driver.open_attempts(), 1);
        assert_eq!(connector.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_terminal() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.shutdown().await;
        connector.connect().await.unwrap_err();
        connector.shutdown().await;

        assert_eq!(connector.state(), ConnectionState::Disconnected);
        assert_eq!(driver.open_attempts(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_live_handle() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(Arc::new(driver), settings());

        connector.connect().await.unwrap();
        let handle = connector.live_handle().await.unwrap();
        handle.insert_one(doc! { "name": "x" }).await.unwrap();

        connector.shutdown().await;
        assert!(handle.find_all().await.is_err());
        assert!(!connector.is_ready());
    }

    #[tokio::test]
    async fn overlapping_connects_share_one_attempt() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        let (a, b) = tokio::join!(connector.connect(), connector.connect());

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(driver.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_collection_setup_closes_handle_and_retries() {
        let driver = MemoryDriver::new();
        driver.set_fail_ensure_collection(true);
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.start().await;
        wait_for_state(&connector, ConnectionState::Failed).await;
        assert_eq!(driver.open_attempts(), 1);
        assert_eq!(driver.closed_handles(), 1);
        assert!(connector.live_handle().await.is_err());

        driver.set_fail_ensure_collection(false);
        wait_for_state(&connector, ConnectionState::Ready).await;
        assert_eq!(driver.open_attempts(), 2);
        assert!(driver.collection_created());

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn failed_reconnect_releases_previous_handle() {
        let driver = MemoryDriver::new();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.connect().await.unwrap();
        let first = connector.live_handle().await.unwrap();

        driver.set_fail_ensure_collection(true);
        assert!(connector.connect().await.is_err());

        assert_eq!(connector.state(), ConnectionState::Failed);
        assert!(connector.live_handle().await.is_err());
        // The previous handle plus the one opened by the failed attempt.
        assert_eq!(driver.closed_handles(), 2);
        assert!(first.ping().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_for_start() {
        let driver = MemoryDriver::unreachable();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        connector.connect().await.unwrap_err();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(driver.open_attempts(), 1);
        assert_eq!(connector.state(), ConnectionState::Failed);

        driver.set_reachable(true);
        connector.start().await;
        wait_for_state(&connector, ConnectionState::Ready).await;

        connector.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_failing_attempt_stays_disconnected() {
        let driver = MemoryDriver::unreachable();
        let connector = StoreConnector::new(Arc::new(driver.clone()), settings());

        let attempt = tokio::spawn({
            let connector = Arc::clone(&connector);
            async move { connector.connect().await }
        });
        let mut rx = connector.subscribe();
        rx.wait_for(|s| *s != ConnectionState::Disconnected)
            .await
            .unwrap();

        connector.shutdown().await;
        assert!(attempt.await.unwrap().is_err());
        assert_eq!(connector.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(connector.connect().await.is_err());
        assert_eq!(connector.state(), ConnectionState::Disconnected);
        assert_eq!(driver.open_attempts(), 1);
    }
}
