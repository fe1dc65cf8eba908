//! Cache Entry Module
//!
//! Defines the structure for individual layered cache entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::TtlPolicy;

// == Cache Entry ==
/// A cached value with its write time and type tag.
///
/// Stored as-is in the memory tier and as JSON in the persisted tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value
    #[serde(rename = "data")]
    pub value: Value,
    /// Write timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Data-type tag that selects the TTL
    #[serde(rename = "type")]
    pub cache_type: String,
    /// Optional entity id within the type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry written at `now_ms`.
    pub fn new(value: Value, cache_type: &str, id: Option<&str>, now_ms: u64) -> Self {
        Self {
            value,
            timestamp: now_ms,
            cache_type: cache_type.to_string(),
            id: id.map(str::to_string),
        }
    }

    // == Is Expired ==
    /// Checks the entry against the policy for its own type.
    pub fn is_expired(&self, policy: &TtlPolicy, now_ms: u64) -> bool {
        policy.is_expired(&self.cache_type, self.timestamp, now_ms)
    }

    // == Age ==
    /// Milliseconds since the entry was written.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(json!({"a": 1}), "users", Some("u1"), 500);

        assert_eq!(entry.value, json!({"a": 1}));
        assert_eq!(entry.timestamp, 500);
        assert_eq!(entry.cache_type, "users");
        assert_eq!(entry.id.as_deref(), Some("u1"));
        assert_eq!(entry.age_ms(800), 300);
    }

    #[test]
    fn test_entry_expiration_uses_own_type() {
        let policy = TtlPolicy::default().with_ttl("short", 100);
        let entry = CacheEntry::new(json!(1), "short", None, 1_000);

        assert!(!entry.is_expired(&policy, 1_099));
        assert!(entry.is_expired(&policy, 1_100));
    }

    #[test]
    fn test_entry_serialized_shape() {
        let entry = CacheEntry::new(json!("v"), "chats", None, 7);
        let encoded = serde_json::to_value(&entry).unwrap();

        assert_eq!(encoded, json!({"data": "v", "timestamp": 7, "type": "chats"}));

        let decoded: CacheEntry = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, entry);
    }
}
