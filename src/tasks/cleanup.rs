//! Cache Cleanup Task
//!
//! Background task that periodically sweeps expired layered cache entries
//! and stale memoized responses.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::{LayeredCache, RequestDeduplicator};

/// Spawns a background task that sweeps the caches once at startup and then
/// every `cleanup_interval_secs`.
///
/// The returned handle is aborted during graceful shutdown.
pub fn spawn_cleanup_task(
    layered: Arc<LayeredCache>,
    dedup: RequestDeduplicator,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let period = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs = period.as_secs(),
            "starting cache cleanup task"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately
            ticker.tick().await;

            let expired = layered.cleanup().await;
            let responses = dedup.cleanup().await;

            if expired + responses > 0 {
                info!(expired, responses, "cache cleanup sweep");
            } else {
                debug!("cache cleanup: nothing to remove");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{types, TtlPolicy};
    use crate::clock::ManualClock;
    use crate::error::PortalError;
    use crate::storage::{DurableBlobStore, MemoryBlobBackend, MemoryKeyValueStore};
    use serde_json::json;

    const HOUR_MS: u64 = 60 * 60 * 1000;

    fn fixtures() -> (Arc<ManualClock>, Arc<LayeredCache>, RequestDeduplicator) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let blob = Arc::new(DurableBlobStore::new(
            Arc::new(MemoryBlobBackend::new()),
            clock.clone(),
        ));
        let layered = Arc::new(LayeredCache::new(
            Arc::new(MemoryKeyValueStore::new()),
            blob,
            TtlPolicy::standard(24 * HOUR_MS),
            clock.clone(),
            "test_",
        ));
        let dedup = RequestDeduplicator::new(5 * 60 * 1000, clock.clone());
        (clock, layered, dedup)
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let (clock, layered, dedup) = fixtures();
        layered.set(types::CHATS, json!([]), None).await;
        dedup
            .dedupe("k", || async { Ok::<_, PortalError>(1u32) })
            .await
            .unwrap();

        clock.advance(Duration::from_millis(HOUR_MS));
        let handle = spawn_cleanup_task(layered.clone(), dedup.clone(), 60);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(layered.stats().await.total_entries, 0);
        assert_eq!(dedup.response_count().await, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_live_and_permanent_entries() {
        let (clock, layered, dedup) = fixtures();
        layered.set(types::USERS, json!({"uid": "u1"}), Some("u1")).await;
        layered.set(types::COURSE, json!({"id": "c1"}), Some("c1")).await;

        clock.advance(Duration::from_millis(HOUR_MS));
        let handle = spawn_cleanup_task(layered.clone(), dedup, 60);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(layered.get(types::USERS, Some("u1")).await.is_some());
        assert!(layered.get(types::COURSE, Some("c1")).await.is_some());

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let (_clock, layered, dedup) = fixtures();

        let handle = spawn_cleanup_task(layered, dedup, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "task should be finished after abort");
    }
}
