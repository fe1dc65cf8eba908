//! Cache Module
//!
//! The three caches fronting the remote store:
//! - [`LayeredCache`]: memory, persisted and blob tiers with per-type TTLs
//! - [`FlatCache`]: fixed-lifetime user, course and course-list entries
//! - [`RequestDeduplicator`]: single-flight requests with a response memo
//!
//! All lifetimes come from one [`TtlPolicy`].

mod dedup;
mod entry;
mod flat;
mod layered;
mod policy;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use dedup::{FlightHandle, RequestDeduplicator};
pub use entry::CacheEntry;
pub use flat::{course_key, user_key, FlatCache, COURSE_LIST_KEY, COURSE_PREFIX, USER_PREFIX};
pub use layered::LayeredCache;
pub use policy::{types, TtlPolicy, PERMANENT_TYPES};
pub use stats::{CacheStats, FlatCacheStats, TierHit};
