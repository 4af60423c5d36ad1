use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed};
use service_core::error::AppError;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub store: StoreConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Upper bound on server selection and socket connect while opening.
    pub connect_timeout_ms: u64,
}

impl MongoConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StoreBackend::Mongodb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}', expected mongodb or memory", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl StoreConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// OTLP collector; trace export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl MapConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_production();

        let backend = get_env("STORE_BACKEND", Some("mongodb"), false)?
            .parse::<StoreBackend>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        Ok(MapConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("mapApp"), is_prod)?,
                collection: get_env("MONGODB_COLLECTION", Some("mapApp"), is_prod)?,
                connect_timeout_ms: get_millis("MONGODB_CONNECT_TIMEOUT_MS", 5000)?,
            },
            store: StoreConfig {
                backend,
                retry_delay_ms: get_millis("STORE_RETRY_DELAY_MS", 5000)?,
                heartbeat_interval_ms: get_millis("STORE_HEARTBEAT_INTERVAL_MS", 10_000)?,
            },
            observability: ObservabilityConfig {
                log_level: get_env("LOG_LEVEL", Some("info"), false)?,
                otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            },
        })
    }

    /// Defaults matching an unconfigured local run, with the in-memory store.
    pub fn for_local(port: u16) -> Self {
        MapConfig {
            common: core_config::Config { port },
            mongodb: MongoConfig {
                uri: "mongodb://localhost:27017".to_string(),
                database: "mapApp".to_string(),
                collection: "mapApp".to_string(),
                connect_timeout_ms: 5000,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                retry_delay_ms: 5000,
                heartbeat_interval_ms: 10_000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
        }
    }
}

/// Reads a millisecond duration that must be non-zero.
fn get_millis(key: &str, default: u64) -> Result<u64, AppError> {
    let value: u64 = get_env_parsed(key, default, false)?;
    if value == 0 {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(value)
}
