//! Driver seam between the connector and the external document store.
//!
//! A [`StoreDriver`] knows how to reach a store; every successful
//! [`StoreDriver::open`] yields a fresh [`MapStore`] handle owning its own
//! connection. The connector decides when to open and close handles.

pub mod memory;
pub mod mongo;

pub use memory::{MemoryDriver, MemoryStore};
pub use mongo::{MongoDriver, MongoStore};

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use service_core::error::AppError;
use std::sync::Arc;

#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Opens a new connection and proves the store is reachable.
    ///
    /// Failures are reported as [`AppError::Connection`].
    async fn open(&self) -> Result<Arc<dyn MapStore>, AppError>;

    /// Human-readable target for logs, without credentials.
    fn describe(&self) -> String;
}

/// A live handle on the target collection.
#[async_trait]
pub trait MapStore: Send + Sync {
    /// Creates the target collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), AppError>;

    async fn find_all(&self) -> Result<Vec<Document>, AppError>;

    /// Inserts `doc` and returns the identifier the store assigned.
    async fn insert_one(&self, doc: Document) -> Result<Bson, AppError>;

    /// Removes every document, returning how many were removed.
    async fn delete_all(&self) -> Result<u64, AppError>;

    async fn ping(&self) -> Result<(), AppError>;

    /// Releases the underlying connection. Safe to call more than once.
    async fn close(&self);
}
