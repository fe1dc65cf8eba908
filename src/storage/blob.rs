//! Durable Blob Store
//!
//! Last-resort cache tier for large or permanent payloads. The store opens
//! its backing engine lazily and exactly once; when the engine is missing or
//! failing every operation degrades to a safe default instead of an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::error::StoreError;

/// Current on-disk schema version of blob entries.
pub const BLOB_SCHEMA_VERSION: u32 = 1;

// == Blob Entry ==
/// A stored payload with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub key: String,
    pub data: Value,
    #[serde(rename = "type")]
    pub cache_type: String,
    /// Write time (Unix milliseconds)
    pub timestamp: u64,
    /// Serialized byte length of `data`
    pub size: usize,
}

// == Blob Stats ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlobStats {
    pub entries: usize,
    pub total_size_bytes: usize,
}

// == Backend Trait ==
/// Asynchronous engine behind the blob store.
#[async_trait]
pub trait BlobBackend: Send + Sync + fmt::Debug {
    /// Opens the engine, running the schema upgrade hook when the stored
    /// version is older than `schema_version`.
    async fn open(&self, schema_version: u32) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<BlobEntry>, StoreError>;

    async fn put(&self, entry: BlobEntry) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn entries(&self) -> Result<Vec<BlobEntry>, StoreError>;
}

// == Durable Blob Store ==
/// Best-effort blob tier. Never returns errors to callers.
pub struct DurableBlobStore {
    backend: Arc<dyn BlobBackend>,
    clock: SharedClock,
    ready: OnceCell<bool>,
}

impl DurableBlobStore {
    // == Constructor ==
    pub fn new(backend: Arc<dyn BlobBackend>, clock: SharedClock) -> Self {
        Self {
            backend,
            clock,
            ready: OnceCell::new(),
        }
    }

    // == Ensure Ready ==
    /// Opens the backend on first use; later calls reuse the outcome.
    pub async fn ensure_ready(&self) -> bool {
        *self
            .ready
            .get_or_init(|| async {
                match self.backend.open(BLOB_SCHEMA_VERSION).await {
                    Ok(()) => {
                        info!(schema_version = BLOB_SCHEMA_VERSION, "blob store initialized");
                        true
                    }
                    Err(err) => {
                        warn!(error = %err, "blob store unavailable, continuing without it");
                        false
                    }
                }
            })
            .await
    }

    // == Get ==
    pub async fn get(&self, key: &str) -> Option<BlobEntry> {
        if !self.ensure_ready().await {
            return None;
        }

        match self.backend.get(key).await {
            Ok(Some(entry)) => {
                debug!(key, "blob hit");
                Some(entry)
            }
            Ok(None) => None,
            Err(err) => {
                error!(key, error = %err, "blob get failed");
                None
            }
        }
    }

    // == Set ==
    /// Stores `data` under `key`, recording its serialized size.
    pub async fn set(&self, key: &str, data: &Value, cache_type: &str) -> bool {
        if !self.ensure_ready().await {
            return false;
        }

        let size = match serde_json::to_vec(data) {
            Ok(bytes) => bytes.len(),
            Err(err) => {
                error!(key, error = %err, "blob value not serializable");
                return false;
            }
        };

        let entry = BlobEntry {
            key: key.to_string(),
            data: data.clone(),
            cache_type: cache_type.to_string(),
            timestamp: self.clock.now_ms(),
            size,
        };

        match self.backend.put(entry).await {
            Ok(()) => {
                debug!(key, size, "blob set");
                true
            }
            Err(err) => {
                error!(key, error = %err, "blob set failed");
                false
            }
        }
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> bool {
        if !self.ensure_ready().await {
            return false;
        }

        match self.backend.delete(key).await {
            Ok(()) => true,
            Err(err) => {
                error!(key, error = %err, "blob delete failed");
                false
            }
        }
    }

    // == Clear ==
    pub async fn clear(&self) -> bool {
        if !self.ensure_ready().await {
            return false;
        }

        match self.backend.clear().await {
            Ok(()) => {
                info!("blob store cleared");
                true
            }
            Err(err) => {
                error!(error = %err, "blob clear failed");
                false
            }
        }
    }

    // == Stats ==
    pub async fn stats(&self) -> BlobStats {
        if !self.ensure_ready().await {
            return BlobStats::default();
        }

        match self.backend.entries().await {
            Ok(entries) => BlobStats {
                entries: entries.len(),
                total_size_bytes: entries.iter().map(|e| e.size).sum(),
            },
            Err(err) => {
                error!(error = %err, "blob stats failed");
                BlobStats::default()
            }
        }
    }
}

impl fmt::Debug for DurableBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableBlobStore")
            .field("backend", &self.backend)
            .field("ready", &self.ready.get())
            .finish()
    }
}

// == Memory Backend ==
/// In-process engine. `unavailable()` builds one that refuses to open.
#[derive(Debug, Default)]
pub struct MemoryBlobBackend {
    entries: RwLock<HashMap<String, BlobEntry>>,
    schema_version: AtomicU32,
    unavailable: bool,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Schema version recorded by the last successful open.
    pub fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn open(&self, schema_version: u32) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("blob engine not supported".to_string()));
        }
        let previous = self.schema_version.swap(schema_version, Ordering::SeqCst);
        if previous != 0 && previous < schema_version {
            self.entries.write().await.clear();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<BlobEntry>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: BlobEntry) -> Result<(), StoreError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<BlobEntry>, StoreError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}
