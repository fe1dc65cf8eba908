//! Flat Cache Module
//!
//! A single-lifetime cache over the persisted tier for user records,
//! individual course records and the course listing. No per-type policy
//! and no permanent exemption: every entry lives for the same fixed TTL.
//!
//! Keys are namespaced by prefix:
//! - `user-{uid}`
//! - `course-{id}`
//! - `course-list` (singleton)

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::FlatCacheStats;
use crate::clock::SharedClock;
use crate::models::{Course, CourseListing, User};
use crate::storage::KeyValueStore;

pub const USER_PREFIX: &str = "user-";
pub const COURSE_PREFIX: &str = "course-";
pub const COURSE_LIST_KEY: &str = "course-list";

/// Stored shape of a flat entry.
#[derive(Debug, Serialize, Deserialize)]
struct FlatEntry {
    value: Value,
    /// Missing timestamps read as expired
    #[serde(default)]
    timestamp: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    User,
    Course,
    CourseList,
}

/// The namespace owning `key`, if any. The course-list singleton is
/// checked first since it shares the course prefix.
fn namespace_of(key: &str) -> Option<Namespace> {
    if key == COURSE_LIST_KEY {
        Some(Namespace::CourseList)
    } else if key.starts_with(USER_PREFIX) {
        Some(Namespace::User)
    } else if key.starts_with(COURSE_PREFIX) {
        Some(Namespace::Course)
    } else {
        None
    }
}

pub fn user_key(uid: &str) -> String {
    format!("{}{}", USER_PREFIX, uid)
}

/// The key for one course, or `None` for an id whose key would be the
/// course-list singleton. Such a course is never flat-cached.
pub fn course_key(course_id: &str) -> Option<String> {
    let key = format!("{}{}", COURSE_PREFIX, course_id);
    (key != COURSE_LIST_KEY).then_some(key)
}

// == Flat Cache ==
#[derive(Debug, Clone)]
pub struct FlatCache {
    store: Arc<dyn KeyValueStore>,
    ttl_ms: u64,
    clock: SharedClock,
}

impl FlatCache {
    // == Constructor ==
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_ms: u64, clock: SharedClock) -> Self {
        Self {
            store,
            ttl_ms,
            clock,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    // == Get Item ==
    /// Returns the value under `key` if present and fresh.
    ///
    /// Expired and corrupted entries are removed and reported as a miss.
    pub fn get_item(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "flat cache miss");
                return None;
            }
            Err(err) => {
                warn!(key, error = %err, "flat cache read failed");
                return None;
            }
        };

        let entry: FlatEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "removing corrupted flat cache entry");
                self.discard(key);
                return None;
            }
        };

        let fresh = entry
            .timestamp
            .is_some_and(|ts| self.clock.now_ms().saturating_sub(ts) < self.ttl_ms);
        if !fresh {
            debug!(key, "flat cache entry expired");
            self.discard(key);
            return None;
        }

        debug!(key, "flat cache hit");
        Some(entry.value)
    }

    // == Set Item ==
    /// Stores `value` stamped with the current time. Write failures are logged.
    pub fn set_item(&self, key: &str, value: &Value) {
        let entry = FlatEntry {
            value: value.clone(),
            timestamp: Some(self.clock.now_ms()),
        };
        let encoded = match serde_json::to_string(&entry) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key, error = %err, "flat cache value not serializable");
                return;
            }
        };

        match self.store.set_item(key, encoded) {
            Ok(()) => debug!(key, "flat cache set"),
            Err(err) => warn!(key, error = %err, "flat cache write failed"),
        }
    }

    // == Remove Item ==
    /// Removes `key` if it lies in one of the flat cache namespaces.
    ///
    /// Returns false for foreign keys, which are left untouched.
    pub fn remove_item(&self, key: &str) -> bool {
        if namespace_of(key).is_none() {
            warn!(key, "refusing to remove key outside flat cache namespaces");
            return false;
        }
        self.discard(key);
        debug!(key, "flat cache remove");
        true
    }

    // == Clear All ==
    /// Removes every key in the flat cache namespaces.
    pub fn clear_all(&self) -> usize {
        let doomed: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| namespace_of(key).is_some())
            .collect();
        for key in &doomed {
            self.discard(key);
        }
        info!(removed = doomed.len(), "flat cache cleared");
        doomed.len()
    }

    // == Stats ==
    pub fn stats(&self) -> FlatCacheStats {
        let mut stats = FlatCacheStats::default();
        for key in self.store.keys() {
            match namespace_of(&key) {
                Some(Namespace::User) => stats.users += 1,
                Some(Namespace::Course) => stats.courses += 1,
                Some(Namespace::CourseList) => stats.course_list += 1,
                None => {}
            }
        }
        stats.total = stats.users + stats.courses + stats.course_list;
        stats
    }

    // == Typed Access ==
    /// Typed `get_item`. A value of the wrong shape is discarded.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_item(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(key, error = %err, "flat cache value has unexpected shape");
                self.discard(key);
                None
            }
        }
    }

    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.set_item(key, &value),
            Err(err) => warn!(key, error = %err, "flat cache value not serializable"),
        }
    }

    // == Users ==
    pub fn cached_user(&self, uid: &str) -> Option<User> {
        self.get_as(&user_key(uid))
    }

    pub fn store_user(&self, user: &User) {
        self.set_as(&user_key(&user.uid), user);
    }

    pub fn remove_user(&self, uid: &str) {
        self.remove_item(&user_key(uid));
    }

    /// Drops the cached user record after an enrollment change.
    pub fn invalidate_user_enrollment(&self, uid: &str) {
        info!(uid, "invalidating enrollment cache");
        self.remove_user(uid);
    }

    // == Courses ==
    pub fn cached_course(&self, course_id: &str) -> Option<Course> {
        self.get_as(&course_key(course_id)?)
    }

    pub fn store_course(&self, course: &Course) {
        match course_key(&course.id) {
            Some(key) => self.set_as(&key, course),
            None => debug!(course_id = %course.id, "course id clashes with the listing key, not caching"),
        }
    }

    pub fn remove_course(&self, course_id: &str) {
        if let Some(key) = course_key(course_id) {
            self.remove_item(&key);
        }
    }

    // == Course List ==
    pub fn cached_course_list(&self) -> Option<Vec<CourseListing>> {
        self.get_as(COURSE_LIST_KEY)
    }

    pub fn store_course_list(&self, listings: &[CourseListing]) {
        self.set_as(COURSE_LIST_KEY, &listings);
    }

    pub fn remove_course_list(&self) {
        self.remove_item(COURSE_LIST_KEY);
    }

    fn discard(&self, key: &str) {
        if let Err(err) = self.store.remove_item(key) {
            warn!(key, error = %err, "flat cache remove failed");
        }
    }
}
