use crate::models::{parse_document, StoredDocument, CREATED_AT_FIELD, ID_FIELD};
use crate::services::connector::StoreConnector;
use crate::services::metrics::record_operation;
use mongodb::bson::{Bson, DateTime as BsonDateTime};
use serde_json::Value;
use service_core::error::AppError;
use std::sync::Arc;

/// Operations on the single map-data collection.
///
/// Each call borrows the connector's live handle for its duration only.
#[derive(Clone)]
pub struct MapCollection {
    connector: Arc<StoreConnector>,
}

impl MapCollection {
    pub fn new(connector: Arc<StoreConnector>) -> Self {
        Self { connector }
    }

    pub async fn list_all(&self) -> Result<Vec<StoredDocument>, AppError> {
        let store = self.connector.live_handle().await?;
        let result = store.find_all().await;
        record_operation("list_all", outcome(&result));

        let documents: Vec<StoredDocument> =
            result?.into_iter().map(StoredDocument::from).collect();
        tracing::info!(count = documents.len(), "Queried map data");
        Ok(documents)
    }

    /// Stores `payload` with a fresh `createdAt`, returning the new `_id`.
    ///
    /// Caller-supplied `_id` and `createdAt` fields are discarded.
    pub async fn insert_one(&self, payload: Value) -> Result<Bson, AppError> {
        let mut doc = parse_document(payload)?;
        doc.remove(ID_FIELD);
        doc.insert(CREATED_AT_FIELD, BsonDateTime::now());

        let store = self.connector.live_handle().await?;
        let result = store.insert_one(doc).await;
        record_operation("insert_one", outcome(&result));

        let id = result?;
        tracing::info!(id = %id, "Saved map data");
        Ok(id)
    }

    /// Removes every document. No filter, no confirmation.
    pub async fn delete_all(&self) -> Result<u64, AppError> {
        let store = self.connector.live_handle().await?;
        let result = store.delete_all().await;
        record_operation("delete_all", outcome(&result));

        let deleted = result?;
        tracing::info!(deleted_count = deleted, "Cleared map data");
        Ok(deleted)
    }
}

fn outcome<T>(result: &Result<T, AppError>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}
