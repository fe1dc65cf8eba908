//! In-process remote store with call accounting, injectable latency and an
//! offline switch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::remote::{ArrayUpdate, ChangeListener, Document, RemoteStore, Snapshot, Subscription, WriteMode};

type Collections = HashMap<String, BTreeMap<String, Document>>;

// == Call Counters ==
/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCalls {
    pub gets: u64,
    pub lists: u64,
    pub creates: u64,
    pub sets: u64,
    pub array_updates: u64,
    pub deletes: u64,
}

impl RemoteCalls {
    pub fn reads(&self) -> u64 {
        self.gets + self.lists
    }

    pub fn writes(&self) -> u64 {
        self.creates + self.sets + self.array_updates + self.deletes
    }
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    lists: AtomicU64,
    creates: AtomicU64,
    sets: AtomicU64,
    array_updates: AtomicU64,
    deletes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RemoteCalls {
        RemoteCalls {
            gets: self.gets.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
            creates: self.creates.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            array_updates: self.array_updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }
}

struct Subscriber {
    id: u64,
    collection: String,
    doc_id: Option<String>,
    listener: ChangeListener,
}

type Subscribers = Arc<Mutex<Vec<Subscriber>>>;

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<Subscriber>> {
    subscribers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

// == In-Memory Remote Store ==
pub struct InMemoryRemoteStore {
    collections: RwLock<Collections>,
    subscribers: Subscribers,
    next_doc: AtomicU64,
    next_subscriber: AtomicU64,
    counters: Counters,
    latency_ms: AtomicU64,
    offline: AtomicBool,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_doc: AtomicU64::new(1),
            next_subscriber: AtomicU64::new(1),
            counters: Counters::default(),
            latency_ms: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Delay applied to every async operation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// While offline every operation fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> RemoteCalls {
        self.counters.snapshot()
    }

    /// Stores a document directly, without counting a call or notifying.
    pub fn seed(&self, collection: &str, id: &str, data: Value) {
        if let Value::Object(map) = data {
            self.write_collections()
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), map);
        }
    }

    /// Reads a document directly, without counting a call.
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.read_collections()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    // == Internals ==
    async fn enter(&self, counter: &AtomicU64) -> Result<(), RemoteError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_online()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("remote store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn read_collections(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_collections(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_state(&self, collection: &str, doc_id: Option<&str>) -> Vec<Snapshot> {
        let collections = self.read_collections();
        let Some(docs) = collections.get(collection) else {
            return Vec::new();
        };
        match doc_id {
            Some(id) => docs
                .get(id)
                .map(|data| vec![Snapshot::new(id, data.clone())])
                .unwrap_or_default(),
            None => docs
                .iter()
                .map(|(id, data)| Snapshot::new(id.clone(), data.clone()))
                .collect(),
        }
    }

    /// Delivers the new state to every subscriber watching the document or
    /// its collection. Listeners run after all locks are released.
    fn notify(&self, collection: &str, doc_id: &str) {
        let targets: Vec<(Option<String>, ChangeListener)> = lock(&self.subscribers)
            .iter()
            .filter(|s| s.collection == collection)
            .filter(|s| s.doc_id.as_deref().map_or(true, |id| id == doc_id))
            .map(|s| (s.doc_id.clone(), s.listener.clone()))
            .collect();

        for (watched, listener) in targets {
            listener(self.current_state(collection, watched.as_deref()));
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Snapshot>, RemoteError> {
        self.enter(&self.counters.gets).await?;
        debug!(collection, id, "remote get");
        Ok(self
            .document(collection, id)
            .map(|data| Snapshot::new(id, data)))
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Snapshot>, RemoteError> {
        self.enter(&self.counters.lists).await?;
        debug!(collection, "remote list");
        Ok(self.current_state(collection, None))
    }

    async fn create_document(&self, collection: &str, data: Document) -> Result<String, RemoteError> {
        self.enter(&self.counters.creates).await?;
        let id = format!("doc{:08}", self.next_doc.fetch_add(1, Ordering::SeqCst));
        self.write_collections()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        debug!(collection, id = %id, "remote create");
        self.notify(collection, &id);
        Ok(id)
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        mode: WriteMode,
    ) -> Result<(), RemoteError> {
        self.enter(&self.counters.sets).await?;
        {
            let mut collections = self.write_collections();
            let docs = collections.entry(collection.to_string()).or_default();
            match (mode, docs.get_mut(id)) {
                (WriteMode::Merge, Some(existing)) => existing.extend(data),
                _ => {
                    docs.insert(id.to_string(), data);
                }
            }
        }
        debug!(collection, id, ?mode, "remote set");
        self.notify(collection, id);
        Ok(())
    }

    async fn update_array_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        update: ArrayUpdate,
    ) -> Result<(), RemoteError> {
        self.enter(&self.counters.array_updates).await?;
        let changed = {
            let mut collections = self.write_collections();
            let docs = collections.entry(collection.to_string()).or_default();
            match update {
                ArrayUpdate::Union(values) => {
                    let doc = docs.entry(id.to_string()).or_default();
                    let slot = doc
                        .entry(field.to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        warn!(collection, id, field, "replacing non-array field on union");
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        for value in values {
                            if !items.contains(&value) {
                                items.push(value);
                            }
                        }
                    }
                    true
                }
                ArrayUpdate::Remove(values) => match docs
                    .get_mut(id)
                    .and_then(|doc| doc.get_mut(field))
                {
                    Some(Value::Array(items)) => {
                        items.retain(|item| !values.contains(item));
                        true
                    }
                    _ => false,
                },
            }
        };
        debug!(collection, id, field, "remote array update");
        if changed {
            self.notify(collection, id);
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.enter(&self.counters.deletes).await?;
        let removed = self
            .write_collections()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        debug!(collection, id, removed, "remote delete");
        if removed {
            self.notify(collection, id);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        collection: &str,
        id: Option<&str>,
        listener: ChangeListener,
    ) -> Result<Subscription, RemoteError> {
        self.check_online()?;

        let subscriber_id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscribers).push(Subscriber {
            id: subscriber_id,
            collection: collection.to_string(),
            doc_id: id.map(str::to_string),
            listener: listener.clone(),
        });
        debug!(collection, id, subscriber_id, "remote subscribe");

        listener(self.current_state(collection, id));

        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(move || {
            lock(&subscribers).retain(|s| s.id != subscriber_id);
            debug!(subscriber_id, "remote unsubscribe");
        }))
    }
}

impl fmt::Debug for InMemoryRemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRemoteStore")
            .field("calls", &self.calls())
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish()
    }
}
