//! In-process store backend for local runs and tests.
//!
//! Reachability can be toggled at runtime to exercise the connector's
//! failure and reconnect paths without an external server.

use super::{MapStore, StoreDriver};
use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct MemoryDriver {
    documents: Arc<RwLock<Vec<Document>>>,
    reachable: Arc<AtomicBool>,
    open_attempts: Arc<AtomicUsize>,
    collection_created: Arc<AtomicBool>,
    fail_ensure_collection: Arc<AtomicBool>,
    closed_handles: Arc<AtomicUsize>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(Vec::new())),
            reachable: Arc::new(AtomicBool::new(true)),
            open_attempts: Arc::new(AtomicUsize::new(0)),
            collection_created: Arc::new(AtomicBool::new(false)),
            fail_ensure_collection: Arc::new(AtomicBool::new(false)),
            closed_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A driver whose store starts out down.
    pub fn unreachable() -> Self {
        let driver = Self::new();
        driver.set_reachable(false);
        driver
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Number of times `open` has been called, successful or not.
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn collection_created(&self) -> bool {
        self.collection_created.load(Ordering::SeqCst)
    }

    /// Makes `ensure_collection` fail on otherwise healthy handles, as a
    /// server rejecting `create` for lack of privileges would.
    pub fn set_fail_ensure_collection(&self, fail: bool) {
        self.fail_ensure_collection.store(fail, Ordering::SeqCst);
    }

    /// Number of handles opened by this driver that have since been closed.
    pub fn closed_handles(&self) -> usize {
        self.closed_handles.load(Ordering::SeqCst)
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreDriver for MemoryDriver {
    async fn open(&self) -> Result<Arc<dyn MapStore>, AppError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        // Stand-in for the network round trip so concurrent callers interleave.
        tokio::task::yield_now().await;
        if !self.is_reachable() {
            return Err(AppError::Connection(anyhow::anyhow!(
                "memory store unreachable: connection refused"
            )));
        }
        Ok(Arc::new(MemoryStore {
            driver: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn describe(&self) -> String {
        "memory://local".to_string()
    }
}

pub struct MemoryStore {
    driver: MemoryDriver,
    closed: AtomicBool,
}

impl MemoryStore {
    fn check_live(&self) -> Result<(), anyhow::Error> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("connection closed");
        }
        if !self.driver.is_reachable() {
            anyhow::bail!("connection reset by peer");
        }
        Ok(())
    }
}

#[async_trait]
impl MapStore for MemoryStore {
    async fn ensure_collection(&self) -> Result<(), AppError> {
        self.check_live().map_err(AppError::Connection)?;
        if self.driver.fail_ensure_collection.load(Ordering::SeqCst) {
            return Err(AppError::Connection(anyhow::anyhow!(
                "not authorized to execute command create"
            )));
        }
        self.driver.collection_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Document>, AppError> {
        self.check_live().map_err(AppError::StoreQuery)?;
        Ok(self.driver.documents.read().await.clone())
    }

    async fn insert_one(&self, mut doc: Document) -> Result<Bson, AppError> {
        self.check_live().map_err(AppError::StoreWrite)?;
        let id = match doc.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert("_id", id.clone());
                id
            }
        };

        let mut documents = self.driver.documents.write().await;
        if documents.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(AppError::StoreWrite(anyhow::anyhow!(
                "E11000 duplicate key error: _id {}",
                id
            )));
        }
        documents.push(doc);
        Ok(id)
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        self.check_live().map_err(AppError::StoreWrite)?;
        let mut documents = self.driver.documents.write().await;
        let removed = documents.len() as u64;
        documents.clear();
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check_live().map_err(AppError::Connection)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.driver.closed_handles.fetch_add(1, Ordering::SeqCst);
        }
    }
}
