//! Remote Document Store
//!
//! The authoritative store behind every cache: named collections of JSON
//! documents addressed by id. Collections may be nested by path, e.g.
//! `gcs/{id}/messages`.

mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PortalError, RemoteError};
use crate::models::RemoteModel;

pub use memory::{InMemoryRemoteStore, RemoteCalls};

/// A document body.
pub type Document = Map<String, Value>;

/// Receives the current state of a subscribed document or collection.
///
/// Document subscriptions deliver zero snapshots once the document is gone.
pub type ChangeListener = Arc<dyn Fn(Vec<Snapshot>) + Send + Sync>;

// == Snapshot ==
/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub data: Document,
}

impl Snapshot {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decodes the body as `T`, copying the id into `T::ID_FIELD`.
    pub fn decode<T: RemoteModel>(self) -> Result<T, PortalError> {
        let Snapshot { id, mut data } = self;
        if let Some(field) = T::ID_FIELD {
            data.insert(field.to_string(), Value::String(id.clone()));
        }
        serde_json::from_value(Value::Object(data)).map_err(|err| {
            PortalError::Internal(format!("document {} has unexpected shape: {}", id, err))
        })
    }

    /// The body with the id inserted under `"id"`.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Value::Object(data)
    }
}

/// Serializes `value` as a document body.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, PortalError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(PortalError::Internal(format!(
            "expected a JSON object for a document, got {}",
            other
        ))),
    }
}

// == Write Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole document
    Overwrite,
    /// Replace only the given top-level fields, creating the document if needed
    Merge,
}

/// Set operations on an array field.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayUpdate {
    /// Append values not already present; creates a missing document
    Union(Vec<Value>),
    /// Drop every element equal to one of the values; no-op on a missing document
    Remove(Vec<Value>),
}

// == Subscription ==
/// A live subscription. Ends on `unsubscribe` or drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// == Remote Store Trait ==
#[async_trait]
pub trait RemoteStore: Send + Sync + fmt::Debug {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Snapshot>, RemoteError>;

    async fn list_documents(&self, collection: &str) -> Result<Vec<Snapshot>, RemoteError>;

    /// Stores a new document and returns the id assigned to it.
    async fn create_document(&self, collection: &str, data: Document) -> Result<String, RemoteError>;

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        mode: WriteMode,
    ) -> Result<(), RemoteError>;

    async fn update_array_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        update: ArrayUpdate,
    ) -> Result<(), RemoteError>;

    /// Deleting a missing document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// Watches one document, or the whole collection when `id` is `None`.
    /// The listener is called once with the current state, then on every change.
    fn subscribe(
        &self,
        collection: &str,
        id: Option<&str>,
        listener: ChangeListener,
    ) -> Result<Subscription, RemoteError>;
}
