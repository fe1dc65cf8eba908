//! Persisted Key-Value Tier
//!
//! Synchronous string store shared by the layered cache and the flat cache.
//! Writes may fail (quota exceeded); callers are expected to recover.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;

// == Key-Value Store Trait ==
/// A synchronous string key-value store with indexed key access.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_item(&self, key: &str, value: String) -> Result<(), StoreError>;

    fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// Key at position `index`, in the store's iteration order.
    fn key(&self, index: usize) -> Option<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every key currently stored.
    fn keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|i| self.key(i)).collect()
    }
}

// == Memory Key-Value Store ==
/// In-process implementation with an optional byte quota.
///
/// Usage is counted as key length plus value length, like a browser's
/// storage area.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    items: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used.
    pub fn used_bytes(&self) -> usize {
        self.read()
            .map(|items| items.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.items
            .read()
            .map_err(|_| StoreError::Unavailable("key-value store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.items
            .write()
            .map_err(|_| StoreError::Unavailable("key-value store lock poisoned".to_string()))
    }
}

impl fmt::Debug for MemoryKeyValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeyValueStore")
            .field("len", &self.len())
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut items = self.write()?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        items.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.write()?.remove(key);
        Ok(())
    }

    fn key(&self, index: usize) -> Option<String> {
        self.read().ok()?.keys().nth(index).cloned()
    }

    fn len(&self) -> usize {
        self.read().map(|items| items.len()).unwrap_or(0)
    }

    fn keys(&self) -> Vec<String> {
        self.read()
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryKeyValueStore::new();
        store.set_item("a", "1".to_string()).unwrap();

        assert_eq!(store.get_item("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.len(), 1);

        store.remove_item("a").unwrap();
        assert_eq!(store.get_item("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_indexed_keys_are_ordered() {
        let store = MemoryKeyValueStore::new();
        store.set_item("b", "2".to_string()).unwrap();
        store.set_item("a", "1".to_string()).unwrap();

        assert_eq!(store.key(0), Some("a".to_string()));
        assert_eq!(store.key(1), Some("b".to_string()));
        assert_eq!(store.key(2), None);
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_quota_exceeded() {
        let store = MemoryKeyValueStore::with_quota(10);
        store.set_item("k", "12345".to_string()).unwrap();

        let result = store.set_item("other", "123456".to_string());
        assert!(matches!(result, Err(StoreError::QuotaExceeded { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_quota_allows_overwrite_in_place() {
        let store = MemoryKeyValueStore::with_quota(10);
        store.set_item("k", "12345678".to_string()).unwrap();
        store.set_item("k", "87654321".to_string()).unwrap();

        assert_eq!(store.used_bytes(), 9);
    }
}
