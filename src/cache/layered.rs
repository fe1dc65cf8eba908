//! Layered Cache Module
//!
//! Three-tier cache: an in-process memory map, the persisted key-value tier,
//! and the durable blob store for permanent types. Lookups walk the tiers
//! from fastest to slowest and repopulate the faster tiers on the way back.
//!
//! Tier failures never reach the caller: a failed read is a miss and a
//! failed write is skipped, both logged with the affected key.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::stats::{TierCounters, TierHit};
use crate::cache::{CacheEntry, CacheStats, TtlPolicy};
use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::storage::{DurableBlobStore, KeyValueStore};

// == Layered Cache ==
#[derive(Debug)]
pub struct LayeredCache {
    /// Fastest tier
    memory: RwLock<HashMap<String, CacheEntry>>,
    /// Persisted tier, shared with other users of the store
    persisted: Arc<dyn KeyValueStore>,
    /// Last-resort tier for permanent types
    blob: Arc<DurableBlobStore>,
    policy: TtlPolicy,
    clock: SharedClock,
    /// Namespace of this cache's keys in the persisted tier
    prefix: String,
    counters: TierCounters,
}

impl LayeredCache {
    // == Constructor ==
    pub fn new(
        persisted: Arc<dyn KeyValueStore>,
        blob: Arc<DurableBlobStore>,
        policy: TtlPolicy,
        clock: SharedClock,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            persisted,
            blob,
            policy,
            clock,
            prefix: prefix.into(),
            counters: TierCounters::new(),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn blob(&self) -> &DurableBlobStore {
        &self.blob
    }

    // == Key Derivation ==
    /// `prefix + type`, followed by `_id` when an id is given.
    pub fn cache_key(&self, cache_type: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}{}_{}", self.prefix, cache_type, id),
            None => format!("{}{}", self.prefix, cache_type),
        }
    }

    /// Whether `key` was derived from `cache_type`, with or without an id.
    fn key_belongs_to(&self, key: &str, cache_type: &str) -> bool {
        let base = self.cache_key(cache_type, None);
        match key.strip_prefix(base.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('_'),
            None => false,
        }
    }

    // == Get ==
    /// Looks `type`/`id` up tier by tier.
    pub async fn get(&self, cache_type: &str, id: Option<&str>) -> Option<Value> {
        let key = self.cache_key(cache_type, id);
        let now = self.clock.now_ms();

        // Memory tier
        let cached = self.memory.read().await.get(&key).cloned();
        if let Some(entry) = cached {
            if !entry.is_expired(&self.policy, now) {
                debug!(key = %key, tier = "memory", "cache hit");
                self.counters.record(TierHit::Memory);
                return Some(entry.value);
            }
            let mut memory = self.memory.write().await;
            if memory
                .get(&key)
                .is_some_and(|e| e.is_expired(&self.policy, now))
            {
                memory.remove(&key);
            }
        }

        // Persisted tier
        if let Some(entry) = self.read_persisted(&key) {
            if !entry.is_expired(&self.policy, now) {
                debug!(key = %key, tier = "persisted", "cache hit");
                self.counters.record(TierHit::Persisted);
                let value = entry.value.clone();
                self.memory.write().await.insert(key, entry);
                return Some(value);
            }
            self.remove_persisted(&key);
        }

        // Blob tier, permanent types only
        if self.policy.is_permanent(cache_type) {
            if let Some(blob) = self.blob.get(&key).await {
                let entry = CacheEntry {
                    value: blob.data,
                    timestamp: blob.timestamp,
                    cache_type: blob.cache_type,
                    id: id.map(str::to_string),
                };
                if let Err(err) = self.write_persisted(&key, &entry) {
                    warn!(key = %key, error = %err, "persisted tier full, serving blob hit from memory");
                }
                debug!(key = %key, tier = "blob", "cache hit");
                self.counters.record(TierHit::Blob);
                let value = entry.value.clone();
                self.memory.write().await.insert(key, entry);
                return Some(value);
            }
        }

        debug!(key = %key, "cache miss");
        self.counters.record(TierHit::Miss);
        None
    }

    /// Typed `get`. An entry that does not decode as `T` is invalidated.
    pub async fn get_as<T: DeserializeOwned>(&self, cache_type: &str, id: Option<&str>) -> Option<T> {
        let value = self.get(cache_type, id).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(key = %self.cache_key(cache_type, id), error = %err, "cached value has unexpected shape");
                self.invalidate(cache_type, id).await;
                None
            }
        }
    }

    // == Set ==
    /// Writes memory and persisted tiers, and the blob tier for permanent types.
    ///
    /// A failed persisted write triggers one cleanup pass and a retry.
    pub async fn set(&self, cache_type: &str, data: Value, id: Option<&str>) {
        let key = self.cache_key(cache_type, id);
        let entry = CacheEntry::new(data, cache_type, id, self.clock.now_ms());

        self.memory.write().await.insert(key.clone(), entry.clone());

        if let Err(err) = self.write_persisted(&key, &entry) {
            warn!(key = %key, error = %err, "persisted write failed, cleaning up and retrying");
            self.cleanup().await;
            match self.write_persisted(&key, &entry) {
                Ok(()) => debug!(key = %key, "persisted write succeeded after cleanup"),
                Err(err) => error!(key = %key, error = %err, "persisted write failed after cleanup"),
            }
        }

        if self.policy.is_permanent(cache_type) {
            self.blob.set(&key, &entry.value, cache_type).await;
        }

        debug!(key = %key, "cache set");
    }

    /// Typed `set`. Values that fail to serialize are not cached.
    pub async fn set_as<T: Serialize>(&self, cache_type: &str, data: &T, id: Option<&str>) {
        match serde_json::to_value(data) {
            Ok(value) => self.set(cache_type, value, id).await,
            Err(err) => {
                warn!(key = %self.cache_key(cache_type, id), error = %err, "value not cacheable");
            }
        }
    }

    // == Invalidate ==
    /// Removes one key from the memory and persisted tiers. The blob tier
    /// keeps its copy, so a permanent type can come back from it.
    pub async fn invalidate(&self, cache_type: &str, id: Option<&str>) {
        let key = self.cache_key(cache_type, id);
        self.memory.write().await.remove(&key);
        self.remove_persisted(&key);
        debug!(key = %key, "cache invalidate");
    }

    /// Removes one key from every tier, blob included.
    pub async fn purge(&self, cache_type: &str, id: Option<&str>) {
        self.invalidate(cache_type, id).await;
        self.blob.delete(&self.cache_key(cache_type, id)).await;
    }

    // == Invalidate Type ==
    /// Removes every key of `cache_type` from the memory and persisted tiers.
    ///
    /// Returns the number of persisted entries removed.
    pub async fn invalidate_type(&self, cache_type: &str) -> usize {
        self.memory
            .write()
            .await
            .retain(|key, _| !self.key_belongs_to(key, cache_type));

        let doomed: Vec<String> = self
            .persisted
            .keys()
            .into_iter()
            .filter(|key| self.key_belongs_to(key, cache_type))
            .collect();
        for key in &doomed {
            self.remove_persisted(key);
        }

        info!(cache_type, removed = doomed.len(), "cache invalidate type");
        doomed.len()
    }

    // == Clear ==
    /// Drops every memory entry and every persisted entry under the prefix.
    pub async fn clear(&self) -> usize {
        self.memory.write().await.clear();

        let doomed = self.own_persisted_keys();
        for key in &doomed {
            self.remove_persisted(key);
        }

        info!(removed = doomed.len(), "cache clear");
        doomed.len()
    }

    /// Clears the blob tier and invalidates every permanent type.
    pub async fn clear_permanent(&self) {
        self.blob.clear().await;
        for cache_type in self.policy.permanent_types() {
            self.invalidate_type(&cache_type).await;
        }
        info!("permanent cache cleared");
    }

    // == Cleanup ==
    /// Removes expired non-permanent entries from the memory and persisted
    /// tiers, plus persisted entries that no longer decode.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();

        let memory_removed = {
            let mut memory = self.memory.write().await;
            let before = memory.len();
            memory.retain(|_, entry| !entry.is_expired(&self.policy, now));
            before - memory.len()
        };

        let mut persisted_removed = 0;
        for key in self.own_persisted_keys() {
            let stale = match self.persisted.get_item(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                    Ok(entry) => entry.is_expired(&self.policy, now),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(err) => {
                    warn!(key = %key, error = %err, "persisted read failed during cleanup");
                    false
                }
            };
            if stale {
                self.remove_persisted(&key);
                persisted_removed += 1;
            }
        }

        let removed = memory_removed + persisted_removed;
        if removed > 0 {
            info!(memory_removed, persisted_removed, "cache cleanup removed expired entries");
        } else {
            debug!("cache cleanup: no expired entries found");
        }
        removed
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let memory_entries = self.memory.read().await.len();
        let persisted_entries = self.own_persisted_keys().len();
        self.counters.snapshot(memory_entries, persisted_entries)
    }

    // == Pre-warm ==
    /// Caches each item that carries a string `id` under `cache_type`.
    ///
    /// Returns the number of items cached.
    pub async fn pre_warm(&self, cache_type: &str, items: &[Value]) -> usize {
        let mut warmed = 0;
        for item in items {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                self.set(cache_type, item.clone(), Some(id)).await;
                warmed += 1;
            }
        }
        info!(cache_type, warmed, "cache pre-warm");
        warmed
    }

    // == Persisted Tier Helpers ==
    fn own_persisted_keys(&self) -> Vec<String> {
        self.persisted
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(&self.prefix))
            .collect()
    }

    fn read_persisted(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.persisted.get_item(key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, error = %err, "persisted read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key, error = %err, "removing corrupted persisted entry");
                self.remove_persisted(key);
                None
            }
        }
    }

    fn write_persisted(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(entry).map_err(|err| StoreError::Corrupted {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        self.persisted.set_item(key, encoded)
    }

    fn remove_persisted(&self, key: &str) {
        if let Err(err) = self.persisted.remove_item(key) {
            warn!(key, error = %err, "persisted remove failed");
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types;
    use crate::clock::ManualClock;
    use crate::storage::{MemoryBlobBackend, MemoryKeyValueStore};
    use serde_json::json;
    use std::time::Duration;

    const PREFIX: &str = "portal_cache_";

    struct Fixture {
        clock: Arc<ManualClock>,
        persisted: Arc<MemoryKeyValueStore>,
        blob: Arc<DurableBlobStore>,
        cache: LayeredCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_store(MemoryKeyValueStore::new())
        }

        fn with_store(store: MemoryKeyValueStore) -> Self {
            let clock = Arc::new(ManualClock::new(1_000_000));
            let persisted = Arc::new(store);
            let blob = Arc::new(DurableBlobStore::new(
                Arc::new(MemoryBlobBackend::new()),
                clock.clone(),
            ));
            let cache = LayeredCache::new(
                persisted.clone(),
                blob.clone(),
                TtlPolicy::default(),
                clock.clone(),
                PREFIX,
            );
            Self {
                clock,
                persisted,
                blob,
                cache,
            }
        }

        /// A second cache over the same persisted and blob tiers, with an
        /// empty memory tier.
        fn sibling(&self) -> LayeredCache {
            LayeredCache::new(
                self.persisted.clone(),
                self.blob.clone(),
                TtlPolicy::default(),
                self.clock.clone(),
                PREFIX,
            )
        }
    }

    #[test]
    fn test_key_derivation() {
        let f = Fixture::new();
        assert_eq!(f.cache.cache_key("course", Some("c1")), "portal_cache_course_c1");
        assert_eq!(f.cache.cache_key("courses", None), "portal_cache_courses");
        assert_ne!(
            f.cache.cache_key("course", Some("x")),
            f.cache.cache_key("courseItems", Some("x"))
        );
    }

    #[tokio::test]
    async fn test_set_and_get_from_memory() {
        let f = Fixture::new();
        f.cache.set(types::CHATS, json!([1, 2]), None).await;

        assert_eq!(f.cache.get(types::CHATS, None).await, Some(json!([1, 2])));
        assert_eq!(f.cache.stats().await.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_persisted_hit_repopulates_memory() {
        let f = Fixture::new();
        f.cache.set(types::USERS, json!({"uid": "u1"}), Some("u1")).await;

        let sibling = f.sibling();
        assert_eq!(sibling.get(types::USERS, Some("u1")).await, Some(json!({"uid": "u1"})));
        assert_eq!(sibling.get(types::USERS, Some("u1")).await, Some(json!({"uid": "u1"})));

        let stats = sibling.stats().await;
        assert_eq!(stats.persisted_hits, 1);
        assert_eq!(stats.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_blob_hit_for_permanent_type() {
        let f = Fixture::new();
        f.cache.set(types::COURSE, json!({"name": "Algo"}), Some("c1")).await;
        f.persisted.remove_item("portal_cache_course_c1").unwrap();

        let sibling = f.sibling();
        assert_eq!(sibling.get(types::COURSE, Some("c1")).await, Some(json!({"name": "Algo"})));
        assert_eq!(sibling.stats().await.blob_hits, 1);

        // Both faster tiers were refilled
        assert!(f.persisted.get_item("portal_cache_course_c1").unwrap().is_some());
        assert_eq!(sibling.get(types::COURSE, Some("c1")).await, Some(json!({"name": "Algo"})));
        assert_eq!(sibling.stats().await.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_non_permanent_type_skips_blob() {
        let f = Fixture::new();
        f.cache.set(types::CHATS, json!("x"), None).await;

        assert_eq!(f.blob.stats().await.entries, 0);
        f.persisted.remove_item("portal_cache_chats").unwrap();
        assert!(f.sibling().get(types::CHATS, None).await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let f = Fixture::new();
        f.cache.set(types::CHATS, json!("fresh"), None).await;

        f.clock.advance(Duration::from_secs(30 * 60 - 1));
        assert!(f.cache.get(types::CHATS, None).await.is_some());

        f.clock.advance(Duration::from_secs(1));
        assert!(f.cache.get(types::CHATS, None).await.is_none());
        assert!(f.persisted.get_item("portal_cache_chats").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permanent_type_never_expires() {
        let f = Fixture::new();
        f.cache.set(types::AUTH, json!({"uid": "u1"}), Some("user")).await;

        f.clock.advance(Duration::from_secs(10 * 365 * 24 * 60 * 60));
        assert_eq!(f.cache.cleanup().await, 0);
        assert!(f.cache.get(types::AUTH, Some("user")).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_keeps_blob_copy_and_purge_drops_it() {
        let f = Fixture::new();
        f.cache.set(types::AUTH, json!("session"), Some("user")).await;

        f.cache.invalidate(types::AUTH, Some("user")).await;
        assert!(f.persisted.get_item("portal_cache_auth_user").unwrap().is_none());
        assert_eq!(f.cache.get(types::AUTH, Some("user")).await, Some(json!("session")));

        f.cache.purge(types::AUTH, Some("user")).await;
        assert!(f.cache.get(types::AUTH, Some("user")).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_type_is_scoped() {
        let f = Fixture::new();
        f.cache.set(types::USERS, json!(1), Some("a")).await;
        f.cache.set(types::USERS, json!(2), Some("b")).await;
        f.cache.set(types::CHATS, json!(3), None).await;
        f.cache.set("usersArchive", json!(4), None).await;

        let removed = f.cache.invalidate_type(types::USERS).await;
        assert_eq!(removed, 2);

        assert!(f.cache.get(types::USERS, Some("a")).await.is_none());
        assert!(f.cache.get(types::USERS, Some("b")).await.is_none());
        assert_eq!(f.cache.get(types::CHATS, None).await, Some(json!(3)));
        assert_eq!(f.cache.get("usersArchive", None).await, Some(json!(4)));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_non_permanent() {
        let f = Fixture::new();
        f.cache.set(types::CHATS, json!("old"), None).await;
        f.cache.set(types::COURSES, json!(["c1"]), None).await;
        f.persisted
            .set_item("portal_cache_garbage", "{oops".to_string())
            .unwrap();
        f.persisted.set_item("user-u1", "{oops".to_string()).unwrap();

        f.clock.advance(Duration::from_secs(31 * 60));
        // chats in memory + chats persisted + garbage persisted
        assert_eq!(f.cache.cleanup().await, 3);

        assert!(f.cache.get(types::COURSES, None).await.is_some());
        // Keys outside the prefix are left alone
        assert!(f.persisted.get_item("user-u1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_quota_failure_cleans_up_and_retries() {
        let f = Fixture::with_store(MemoryKeyValueStore::with_quota(200));
        f.cache.set(types::CHATS, json!("x".repeat(80)), None).await;
        f.clock.advance(Duration::from_secs(31 * 60));

        f.cache.set(types::USERS, json!("y".repeat(80)), Some("u1")).await;

        assert!(f.persisted.get_item("portal_cache_chats").unwrap().is_none());
        assert!(f.persisted.get_item("portal_cache_users_u1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_failure_still_serves_memory() {
        let f = Fixture::with_store(MemoryKeyValueStore::with_quota(10));
        f.cache.set(types::USERS, json!("too big for the store"), Some("u1")).await;

        assert_eq!(f.persisted.len(), 0);
        assert_eq!(
            f.cache.get(types::USERS, Some("u1")).await,
            Some(json!("too big for the store"))
        );
    }

    #[tokio::test]
    async fn test_corrupted_persisted_entry_is_a_miss() {
        let f = Fixture::new();
        f.persisted
            .set_item("portal_cache_users_u1", "not json".to_string())
            .unwrap();

        assert!(f.cache.get(types::USERS, Some("u1")).await.is_none());
        assert!(f.persisted.get_item("portal_cache_users_u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_and_clear_permanent() {
        let f = Fixture::new();
        f.cache.set(types::COURSE, json!(1), Some("c1")).await;
        f.cache.set(types::CHATS, json!(2), None).await;
        f.persisted.set_item("course-c1", "{}".to_string()).unwrap();

        assert_eq!(f.cache.clear().await, 2);
        assert_eq!(f.cache.stats().await.total_entries, 0);
        assert!(f.persisted.get_item("course-c1").unwrap().is_some());

        // Blob still has the permanent entry until clear_permanent
        assert!(f.cache.get(types::COURSE, Some("c1")).await.is_some());
        f.cache.clear_permanent().await;
        assert!(f.cache.get(types::COURSE, Some("c1")).await.is_none());
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let f = Fixture::new();
        f.cache.set_as(types::USERS, &vec!["a".to_string()], Some("u1")).await;

        let decoded: Option<Vec<String>> = f.cache.get_as(types::USERS, Some("u1")).await;
        assert_eq!(decoded, Some(vec!["a".to_string()]));

        let wrong: Option<u32> = f.cache.get_as(types::USERS, Some("u1")).await;
        assert!(wrong.is_none());
        assert!(f.cache.get(types::USERS, Some("u1")).await.is_none());
    }

    #[tokio::test]
    async fn test_pre_warm_and_stats() {
        let f = Fixture::new();
        let items = vec![json!({"id": "a"}), json!({"id": "b"}), json!({"name": "no id"})];

        assert_eq!(f.cache.pre_warm(types::USERS, &items).await, 2);

        let stats = f.cache.stats().await;
        assert_eq!(stats.memory_entries, 2);
        assert_eq!(stats.persisted_entries, 2);
        assert_eq!(stats.total_entries, 4);
    }
}
