//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check expiry, permanence, round-trip, type scoping and
//! single-flight behavior across generated inputs.

use proptest::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{types, LayeredCache, RequestDeduplicator, TtlPolicy, PERMANENT_TYPES};
use crate::clock::ManualClock;
use crate::error::{PortalError, Result};
use crate::storage::{DurableBlobStore, MemoryBlobBackend, MemoryKeyValueStore};

// == Test Configuration ==
const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const START_MS: u64 = 1_700_000_000_000;

fn layered_fixture() -> (Arc<ManualClock>, LayeredCache) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let blob = Arc::new(DurableBlobStore::new(
        Arc::new(MemoryBlobBackend::new()),
        clock.clone(),
    ));
    let cache = LayeredCache::new(
        Arc::new(MemoryKeyValueStore::new()),
        blob,
        TtlPolicy::standard(DAY_MS),
        clock.clone(),
        "prop_",
    );
    (clock, cache)
}

// == Strategies ==
/// Generates cache ids
fn id_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,16}"
}

/// Types that expire
fn expiring_type_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(types::USERS),
        Just(types::CHATS),
        Just(types::COURSE_ITEMS_BY_TYPE),
        Just("untyped"),
    ]
}

fn permanent_type_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(PERMANENT_TYPES.to_vec())
}

/// JSON documents without floats, whose text form may not round-trip exactly
fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { id: String, value: Value },
    Get { id: String },
    Invalidate { id: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let id = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string);
    prop_oneof![
        (id.clone(), json_strategy()).prop_map(|(id, value)| CacheOp::Set { id, value }),
        id.clone().prop_map(|id| CacheOp::Get { id }),
        id.prop_map(|id| CacheOp::Invalidate { id }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // An expiring entry is served strictly before its TTL elapses and is a
    // miss from that point on.
    #[test]
    fn prop_ttl_expiry(
        cache_type in expiring_type_strategy(),
        id in id_strategy(),
        value in json_strategy(),
        fraction in 0.0f64..1.0,
        overshoot in 0u64..DAY_MS,
    ) {
        tokio_test::block_on(async {
            let (clock, cache) = layered_fixture();
            let ttl = cache.policy().ttl_ms(cache_type);
            cache.set(cache_type, value.clone(), Some(&id)).await;

            let within = ((ttl as f64) * fraction) as u64;
            clock.set(START_MS + within.min(ttl - 1));
            prop_assert_eq!(cache.get(cache_type, Some(&id)).await, Some(value));

            clock.set(START_MS + ttl + overshoot);
            prop_assert_eq!(cache.get(cache_type, Some(&id)).await, None);
            Ok(())
        })?;
    }

    // Permanent entries never expire; only explicit removal drops them.
    #[test]
    fn prop_permanent_types_never_expire(
        cache_type in permanent_type_strategy(),
        id in id_strategy(),
        value in json_strategy(),
        elapsed_days in 0u64..3650,
    ) {
        tokio_test::block_on(async {
            let (clock, cache) = layered_fixture();
            cache.set(cache_type, value.clone(), Some(&id)).await;

            clock.advance(Duration::from_millis(elapsed_days * DAY_MS));
            prop_assert_eq!(cache.cleanup().await, 0);
            prop_assert_eq!(cache.get(cache_type, Some(&id)).await, Some(value));

            cache.purge(cache_type, Some(&id)).await;
            prop_assert_eq!(cache.get(cache_type, Some(&id)).await, None);
            Ok(())
        })?;
    }

    // What goes in comes back out, with a copy in the persisted tier.
    #[test]
    fn prop_round_trip(
        cache_type in expiring_type_strategy(),
        id in id_strategy(),
        value in json_strategy(),
    ) {
        tokio_test::block_on(async {
            let (_clock, cache) = layered_fixture();
            cache.set(cache_type, value.clone(), Some(&id)).await;
            prop_assert_eq!(cache.get(cache_type, Some(&id)).await, Some(value.clone()));

            let stats = cache.stats().await;
            prop_assert_eq!(stats.persisted_entries, 1);
            Ok(())
        })?;
    }

    // Invalidating a type removes all of its ids and nothing else, even for
    // types whose names share a prefix.
    #[test]
    fn prop_invalidate_type_scoping(
        ids in prop::collection::hash_set(id_strategy(), 1..8),
        other_ids in prop::collection::hash_set(id_strategy(), 1..8),
    ) {
        tokio_test::block_on(async {
            let (_clock, cache) = layered_fixture();
            for id in &ids {
                cache.set("note", Value::from(id.as_str()), Some(id)).await;
            }
            for id in &other_ids {
                cache.set("notes", Value::from(id.as_str()), Some(id)).await;
            }
            cache.set(types::USERS, Value::Null, None).await;

            let removed = cache.invalidate_type("note").await;
            prop_assert_eq!(removed, ids.len());

            for id in &ids {
                prop_assert_eq!(cache.get("note", Some(id)).await, None);
            }
            for id in &other_ids {
                prop_assert_eq!(cache.get("notes", Some(id)).await, Some(Value::from(id.as_str())));
            }
            prop_assert!(cache.get(types::USERS, None).await.is_some());
            Ok(())
        })?;
    }

    // Invalidating a permanent type clears the faster tiers only; every id
    // comes back from the blob tier and repopulates them.
    #[test]
    fn prop_invalidate_type_permanent_restored_from_blob(
        cache_type in permanent_type_strategy(),
        entries in prop::collection::hash_map(id_strategy(), json_strategy(), 1..8),
    ) {
        tokio_test::block_on(async {
            let (_clock, cache) = layered_fixture();
            for (id, value) in &entries {
                cache.set(cache_type, value.clone(), Some(id)).await;
            }

            let removed = cache.invalidate_type(cache_type).await;
            prop_assert_eq!(removed, entries.len());
            prop_assert_eq!(cache.stats().await.persisted_entries, 0);

            for (id, value) in &entries {
                prop_assert_eq!(cache.get(cache_type, Some(id)).await, Some(value.clone()));
            }
            let stats = cache.stats().await;
            prop_assert_eq!(stats.blob_hits, entries.len() as u64);
            prop_assert_eq!(stats.persisted_entries, entries.len());
            Ok(())
        })?;
    }

    // Hit and miss counters follow a simple model of which ids are cached.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        tokio_test::block_on(async {
            let (_clock, cache) = layered_fixture();
            let mut cached: HashSet<String> = HashSet::new();
            let mut expected_hits: u64 = 0;
            let mut expected_misses: u64 = 0;

            for op in ops {
                match op {
                    CacheOp::Set { id, value } => {
                        cache.set(types::USERS, value, Some(&id)).await;
                        cached.insert(id);
                    }
                    CacheOp::Get { id } => {
                        let hit = cache.get(types::USERS, Some(&id)).await.is_some();
                        prop_assert_eq!(hit, cached.contains(&id));
                        if hit {
                            expected_hits += 1;
                        } else {
                            expected_misses += 1;
                        }
                    }
                    CacheOp::Invalidate { id } => {
                        cache.invalidate(types::USERS, Some(&id)).await;
                        cached.remove(&id);
                    }
                }
            }

            let stats = cache.stats().await;
            prop_assert_eq!(stats.memory_hits + stats.persisted_hits + stats.blob_hits, expected_hits);
            prop_assert_eq!(stats.misses, expected_misses);
            prop_assert_eq!(stats.persisted_entries, cached.len());
            Ok(())
        })?;
    }

    // N concurrent callers share a single producer call and one outcome.
    #[test]
    fn prop_single_flight(callers in 2usize..8, fail in any::<bool>(), answer in any::<u32>()) {
        tokio_test::block_on(async {
            let clock = Arc::new(ManualClock::new(START_MS));
            let dedup = RequestDeduplicator::new(5 * 60 * 1000, clock);
            let calls = Arc::new(AtomicUsize::new(0));

            let requests = (0..callers).map(|_| {
                let calls = calls.clone();
                dedup.dedupe("shared", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if fail {
                        Err(PortalError::Internal("remote down".to_string()))
                    } else {
                        Ok(answer)
                    }
                })
            });
            let outcomes: Vec<Result<u32>> = futures::future::join_all(requests).await;

            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            for outcome in &outcomes {
                prop_assert_eq!(outcome, &outcomes[0]);
            }
            prop_assert_eq!(outcomes[0].is_err(), fail);
            Ok(())
        })?;
    }

    // Once a call settles the key is no longer pending, and with no memo
    // window the next call runs the producer again.
    #[test]
    fn prop_registry_self_cleaning(fail in any::<bool>(), rounds in 1usize..5) {
        tokio_test::block_on(async {
            let clock = Arc::new(ManualClock::new(START_MS));
            let dedup = RequestDeduplicator::new(0, clock);
            let calls = Arc::new(AtomicUsize::new(0));

            for round in 1..=rounds {
                let counter = calls.clone();
                let _ = dedup
                    .dedupe::<u32, _, _>("key", move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if fail {
                            Err(PortalError::NotFound("key".to_string()))
                        } else {
                            Ok(7)
                        }
                    })
                    .await;

                prop_assert!(!dedup.is_pending("key").await);
                prop_assert_eq!(calls.load(Ordering::SeqCst), round);
            }
            Ok(())
        })?;
    }
}
