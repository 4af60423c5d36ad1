use super::{MapStore, StoreDriver};
use crate::config::MongoConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{Error as MongoError, ErrorKind},
    options::ClientOptions,
    Client as MongoClient, Collection, Database,
};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Server error code for "collection already exists".
const NAMESPACE_EXISTS: i32 = 48;

pub struct MongoDriver {
    config: MongoConfig,
}

impl MongoDriver {
    pub fn new(config: MongoConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreDriver for MongoDriver {
    async fn open(&self) -> Result<Arc<dyn MapStore>, AppError> {
        let store = MongoStore::connect(&self.config).await?;
        Ok(Arc::new(store))
    }

    fn describe(&self) -> String {
        format!(
            "{} (database: {})",
            redact_uri(&self.config.uri),
            self.config.database
        )
    }
}

pub struct MongoStore {
    client: MongoClient,
    db: Database,
    collection_name: String,
    closed: AtomicBool,
}

impl MongoStore {
    pub async fn connect(config: &MongoConfig) -> Result<Self, AppError> {
        tracing::info!(uri = %redact_uri(&config.uri), "Connecting to MongoDB");

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(connection_error)?;
        options.app_name = Some("map-service".to_string());
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());

        let client = MongoClient::with_options(options).map_err(connection_error)?;
        let db = client.database(&config.database);

        // The driver connects lazily; a ping forces server selection now.
        if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
            tracing::error!("Failed to connect to MongoDB at {}: {}", redact_uri(&config.uri), e);
            client.shutdown().await;
            return Err(connection_error(e));
        }

        tracing::info!(database = %config.database, "Successfully connected to MongoDB database");
        Ok(Self {
            client,
            db,
            collection_name: config.collection.clone(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn collection(&self) -> Collection<Document> {
        self.db.collection(&self.collection_name)
    }
}

#[async_trait]
impl MapStore for MongoStore {
    async fn ensure_collection(&self) -> Result<(), AppError> {
        let existing = self
            .db
            .list_collection_names(doc! { "name": self.collection_name.as_str() })
            .await
            .map_err(connection_error)?;

        if !existing.is_empty() {
            return Ok(());
        }

        tracing::info!(collection = %self.collection_name, "Creating collection");
        match self.db.create_collection(&self.collection_name, None).await {
            Ok(()) => Ok(()),
            Err(e) if command_code(&e) == Some(NAMESPACE_EXISTS) => Ok(()),
            Err(e) => {
                tracing::error!("Failed to create collection {}: {}", self.collection_name, e);
                Err(connection_error(e))
            }
        }
    }

    async fn find_all(&self) -> Result<Vec<Document>, AppError> {
        let cursor = self.collection().find(doc! {}, None).await.map_err(|e| {
            tracing::error!("Failed to query map data: {}", e);
            AppError::StoreQuery(anyhow::Error::new(e))
        })?;

        cursor.try_collect().await.map_err(|e| {
            tracing::error!("Failed to collect map data: {}", e);
            AppError::StoreQuery(anyhow::Error::new(e))
        })
    }

    async fn insert_one(&self, doc: Document) -> Result<Bson, AppError> {
        let result = self.collection().insert_one(doc, None).await.map_err(|e| {
            tracing::error!("Failed to insert map data: {}", e);
            AppError::StoreWrite(anyhow::Error::new(e))
        })?;
        Ok(result.inserted_id)
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let result = self
            .collection()
            .delete_many(doc! {}, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to clear map data: {}", e);
                AppError::StoreWrite(anyhow::Error::new(e))
            })?;
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                connection_error(e)
            })?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.client.clone().shutdown().await;
        tracing::info!("MongoDB connection closed");
    }
}

fn connection_error(e: MongoError) -> AppError {
    AppError::Connection(anyhow::Error::new(e))
}

pub(crate) fn command_code(e: &MongoError) -> Option<i32> {
    match e.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

/// Strips the userinfo part of a connection string.
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***@{}", &uri[..scheme_end + 3], &rest[at + 1..]),
        None => uri.to_string(),
    }
}
