//! Cache Policy Module
//!
//! The lifetime table shared by every cache tier: per-type TTLs for the
//! layered cache, the set of permanent types, the flat cache lifetime and
//! the response memo window.

use std::collections::{HashMap, HashSet};

// == Type Tags ==
/// Well-known data-type tags. Routing of TTL and permanence relies on
/// callers using these consistently.
pub mod types {
    pub const AUTH: &str = "auth";
    pub const COURSES: &str = "courses";
    pub const COURSE: &str = "course";
    pub const COURSE_ITEMS: &str = "courseItems";
    pub const COURSE_ITEMS_BY_CATEGORY: &str = "courseItemsByCategory";
    pub const COURSE_ITEMS_BY_TYPE: &str = "courseItemsByType";
    pub const USERS: &str = "users";
    pub const CHATS: &str = "chats";
}

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Types exempt from expiry-based eviction.
pub const PERMANENT_TYPES: [&str; 5] = [
    types::AUTH,
    types::COURSES,
    types::COURSE,
    types::COURSE_ITEMS,
    types::COURSE_ITEMS_BY_CATEGORY,
];

// == TTL Policy ==
/// Read-only lifetime table.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    ttls: HashMap<String, u64>,
    permanent: HashSet<String>,
    default_ttl_ms: u64,
    flat_ttl_ms: u64,
    response_window_ms: u64,
}

impl TtlPolicy {
    // == Constructor ==
    /// Creates the standard table with the given fallback TTL.
    ///
    /// Course data lives 7 days, users 24 hours, auth a year and chats
    /// 30 minutes. The flat cache lifetime starts at 24 hours and the
    /// response window at 5 minutes.
    pub fn standard(default_ttl_ms: u64) -> Self {
        let ttls = [
            (types::COURSES, 7 * DAY_MS),
            (types::COURSE, 7 * DAY_MS),
            (types::COURSE_ITEMS, 7 * DAY_MS),
            (types::COURSE_ITEMS_BY_CATEGORY, 7 * DAY_MS),
            (types::COURSE_ITEMS_BY_TYPE, 7 * DAY_MS),
            (types::USERS, DAY_MS),
            (types::AUTH, 365 * DAY_MS),
            (types::CHATS, 30 * MINUTE_MS),
        ]
        .into_iter()
        .map(|(t, ttl)| (t.to_string(), ttl))
        .collect();

        Self {
            ttls,
            permanent: PERMANENT_TYPES.iter().map(|t| t.to_string()).collect(),
            default_ttl_ms,
            flat_ttl_ms: DAY_MS,
            response_window_ms: 5 * MINUTE_MS,
        }
    }

    /// Overrides the TTL of one type.
    pub fn with_ttl(mut self, cache_type: &str, ttl_ms: u64) -> Self {
        self.ttls.insert(cache_type.to_string(), ttl_ms);
        self
    }

    /// Marks a type as permanent.
    pub fn with_permanent(mut self, cache_type: &str) -> Self {
        self.permanent.insert(cache_type.to_string());
        self
    }

    /// Removes a type from the permanent set.
    pub fn without_permanent(mut self, cache_type: &str) -> Self {
        self.permanent.remove(cache_type);
        self
    }

    pub fn with_flat_ttl(mut self, ttl_ms: u64) -> Self {
        self.flat_ttl_ms = ttl_ms;
        self
    }

    pub fn with_response_window(mut self, window_ms: u64) -> Self {
        self.response_window_ms = window_ms;
        self
    }

    // == Lookups ==
    /// TTL for a type, falling back to the default.
    pub fn ttl_ms(&self, cache_type: &str) -> u64 {
        self.ttls
            .get(cache_type)
            .copied()
            .unwrap_or(self.default_ttl_ms)
    }

    pub fn is_permanent(&self, cache_type: &str) -> bool {
        self.permanent.contains(cache_type)
    }

    /// Permanent types, sorted.
    pub fn permanent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.permanent.iter().cloned().collect();
        types.sort();
        types
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    pub fn flat_ttl_ms(&self) -> u64 {
        self.flat_ttl_ms
    }

    pub fn response_window_ms(&self) -> u64 {
        self.response_window_ms
    }

    // == Is Expired ==
    /// Whether an entry of `cache_type` written at `timestamp` is stale at `now_ms`.
    ///
    /// Boundary condition: the entry is expired once the full TTL has elapsed.
    /// Permanent types never expire.
    pub fn is_expired(&self, cache_type: &str, timestamp: u64, now_ms: u64) -> bool {
        if self.is_permanent(cache_type) {
            return false;
        }
        now_ms.saturating_sub(timestamp) >= self.ttl_ms(cache_type)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::standard(DAY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_ms(types::CHATS), 30 * MINUTE_MS);
        assert_eq!(policy.ttl_ms(types::USERS), DAY_MS);
        assert_eq!(policy.ttl_ms(types::COURSE), 7 * DAY_MS);
        assert_eq!(policy.ttl_ms("unknown"), DAY_MS);
        assert_eq!(policy.flat_ttl_ms(), DAY_MS);
        assert_eq!(policy.response_window_ms(), 5 * MINUTE_MS);
    }

    #[test]
    fn test_permanent_membership_is_by_tag() {
        let policy = TtlPolicy::default();
        for t in PERMANENT_TYPES {
            assert!(policy.is_permanent(t));
        }
        assert!(!policy.is_permanent(types::COURSE_ITEMS_BY_TYPE));
        assert!(!policy.is_permanent(types::CHATS));
    }

    #[test]
    fn test_expiry_boundary() {
        let policy = TtlPolicy::default().with_ttl("short", 1_000);
        assert!(!policy.is_expired("short", 5_000, 5_999));
        assert!(policy.is_expired("short", 5_000, 6_000));
    }

    #[test]
    fn test_permanent_never_expires() {
        let policy = TtlPolicy::default();
        assert!(!policy.is_expired(types::AUTH, 0, u64::MAX));
    }

    #[test]
    fn test_permanent_overrides() {
        let policy = TtlPolicy::default()
            .with_permanent(types::CHATS)
            .without_permanent(types::AUTH);
        assert!(policy.is_permanent(types::CHATS));
        assert!(!policy.is_permanent(types::AUTH));
    }
}
