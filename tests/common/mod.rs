//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use portal_cache::cache::{FlatCache, LayeredCache, RequestDeduplicator, TtlPolicy};
use portal_cache::clock::ManualClock;
use portal_cache::remote::{InMemoryRemoteStore, RemoteStore};
use portal_cache::storage::{DurableBlobStore, MemoryBlobBackend, MemoryKeyValueStore};
use portal_cache::Portal;
use serde_json::json;

pub const HOUR_MS: u64 = 60 * 60 * 1000;
pub const DAY_MS: u64 = 24 * HOUR_MS;

pub struct TestPortal {
    pub clock: Arc<ManualClock>,
    pub remote: Arc<InMemoryRemoteStore>,
    pub portal: Portal,
}

impl TestPortal {
    pub fn new() -> Self {
        Self::wrapping_remote(|remote| remote as Arc<dyn RemoteStore>)
    }

    /// Builds the portal over `wrap(remote)`, e.g. a store that injects
    /// faults. Seeding still goes through `remote`.
    pub fn wrapping_remote(
        wrap: impl FnOnce(Arc<InMemoryRemoteStore>) -> Arc<dyn RemoteStore>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let remote = Arc::new(InMemoryRemoteStore::new());
        let persisted = Arc::new(MemoryKeyValueStore::new());
        let policy = TtlPolicy::standard(DAY_MS);
        let blob = Arc::new(DurableBlobStore::new(
            Arc::new(MemoryBlobBackend::new()),
            clock.clone(),
        ));
        let layered = Arc::new(LayeredCache::new(
            persisted.clone(),
            blob,
            policy.clone(),
            clock.clone(),
            "portal_cache_",
        ));
        let flat = FlatCache::new(persisted, policy.flat_ttl_ms(), clock.clone());
        let dedup = RequestDeduplicator::new(policy.response_window_ms(), clock.clone());
        let portal = Portal::new(wrap(remote.clone()), layered, flat, dedup);
        Self {
            clock,
            remote,
            portal,
        }
    }

    /// Seeds course `c1` with three items in three categories.
    pub fn with_course() -> Self {
        Self::new().seeded()
    }

    fn seeded(self) -> Self {
        self.remote.seed(
            "courses",
            "c1",
            json!({
                "name": "Algorithms",
                "description": "Graphs and more",
                "items": [
                    {"name": "Intro", "url": "http://a", "category": "videos"},
                    {"name": "Slides", "url": "http://b"},
                    {"name": "PYQ 2023", "url": "http://c", "category": "PYQs and Solutions"}
                ]
            }),
        );
        self
    }

    pub fn with_course_wrapping_remote(
        wrap: impl FnOnce(Arc<InMemoryRemoteStore>) -> Arc<dyn RemoteStore>,
    ) -> Self {
        Self::wrapping_remote(wrap).seeded()
    }
}
