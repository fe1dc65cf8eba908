//! Storage Module
//!
//! Backing stores under the cache tiers: the synchronous persisted
//! key-value tier and the asynchronous durable blob store.

mod blob;
mod fs_blob;
mod kv;

pub use blob::{
    BlobBackend, BlobEntry, BlobStats, DurableBlobStore, MemoryBlobBackend, BLOB_SCHEMA_VERSION,
};
pub use fs_blob::FileBlobBackend;
pub use kv::{KeyValueStore, MemoryKeyValueStore};
