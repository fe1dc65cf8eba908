//! Request Deduplication Module
//!
//! Coalesces concurrent identical requests into one producer call and
//! memoizes successful responses for a short window.
//!
//! Each producer runs on its own task: callers that stop waiting do not
//! cancel it, and its settlement always clears the in-flight registration,
//! even when the producer fails or panics.
//!
//! `forget` and `clear_all` retire the flight registered under a key. A
//! producer holding a [`FlightHandle`] uses it to write side caches only
//! while its flight is still current, so a read that started before a write
//! never stores its older copy after the write.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::error::{PortalError, Result};

type SharedOutcome = Shared<BoxFuture<'static, Result<Value>>>;

/// An in-flight producer call.
struct PendingFlight {
    /// Distinguishes this call from later ones registered under the same key
    id: u64,
    outcome: SharedOutcome,
}

struct CachedResponse {
    data: Value,
    timestamp: u64,
}

#[derive(Default)]
struct DedupState {
    pending: HashMap<String, PendingFlight>,
    responses: HashMap<String, CachedResponse>,
    next_flight: u64,
}

struct Inner {
    state: Mutex<DedupState>,
    window_ms: u64,
    clock: SharedClock,
}

impl Inner {
    fn is_current(state: &DedupState, key: &str, flight_id: u64) -> bool {
        state.pending.get(key).is_some_and(|f| f.id == flight_id)
    }

    // == Settle ==
    /// Unregisters a finished call and memoizes its success.
    ///
    /// A call whose registration was forgotten or cleared meanwhile leaves
    /// no trace.
    async fn settle(&self, key: &str, flight_id: u64, outcome: &Result<Value>) {
        let mut state = self.state.lock().await;

        if !Self::is_current(&state, key, flight_id) {
            debug!(key, "settled request was invalidated, not memoizing");
            return;
        }
        state.pending.remove(key);

        match outcome {
            Ok(data) => {
                state.responses.insert(
                    key.to_string(),
                    CachedResponse {
                        data: data.clone(),
                        timestamp: self.clock.now_ms(),
                    },
                );
                debug!(key, "memoized response");
            }
            Err(err) => debug!(key, error = %err, "request failed, nothing memoized"),
        }
    }
}

// == Flight Handle ==
/// Identifies one producer call. Handed to producers started through
/// [`RequestDeduplicator::dedupe_tracked`].
#[derive(Clone)]
pub struct FlightHandle {
    inner: Arc<Inner>,
    key: String,
    id: u64,
}

impl FlightHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True until the flight settles or its key is forgotten or cleared.
    pub async fn is_current(&self) -> bool {
        let state = self.inner.state.lock().await;
        Inner::is_current(&state, &self.key, self.id)
    }

    /// Runs `write` only if this flight is still current, holding the
    /// registry lock so no `forget` can interleave. Returns `None` when the
    /// flight was retired.
    pub async fn write_if_current<R>(&self, write: impl FnOnce() -> R) -> Option<R> {
        let state = self.inner.state.lock().await;
        if !Inner::is_current(&state, &self.key, self.id) {
            debug!(key = %self.key, "flight retired, skipping cache write");
            return None;
        }
        Some(write())
    }
}

impl std::fmt::Debug for FlightHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

// == Request Deduplicator ==
/// Cheap to clone; clones share the same registry and response cache.
#[derive(Clone)]
pub struct RequestDeduplicator {
    inner: Arc<Inner>,
}

impl RequestDeduplicator {
    // == Constructor ==
    /// Creates a deduplicator memoizing responses for `window_ms`.
    /// A zero window disables memoization.
    pub fn new(window_ms: u64, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DedupState::default()),
                window_ms,
                clock,
            }),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.inner.window_ms
    }

    // == Dedupe ==
    /// Answers `key` from the response cache, from a call already in
    /// flight, or by starting `producer`.
    ///
    /// Every caller joining the same flight receives the same outcome.
    pub async fn dedupe<T, F, Fut>(&self, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.dedupe_tracked(key, move |_| producer()).await
    }

    /// Like [`dedupe`](Self::dedupe), but the producer receives the handle of
    /// its own flight.
    pub async fn dedupe_tracked<T, F, Fut>(&self, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(FlightHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let outcome = {
            let mut state = self.inner.state.lock().await;

            let now = self.inner.clock.now_ms();
            let fresh = state
                .responses
                .get(key)
                .map(|cached| now.saturating_sub(cached.timestamp) < self.inner.window_ms);
            match fresh {
                Some(true) => {
                    debug!(key, "returning memoized response");
                    return decode(key, state.responses[key].data.clone());
                }
                Some(false) => {
                    state.responses.remove(key);
                }
                None => {}
            }

            if let Some(flight) = state.pending.get(key) {
                debug!(key, "joining in-flight request");
                flight.outcome.clone()
            } else {
                let flight_id = state.next_flight;
                state.next_flight += 1;

                let outcome = self.launch(key, flight_id, producer);
                state.pending.insert(
                    key.to_string(),
                    PendingFlight {
                        id: flight_id,
                        outcome: outcome.clone(),
                    },
                );
                outcome
            }
        };

        decode(key, outcome.await?)
    }

    fn launch<T, F, Fut>(&self, key: &str, flight_id: u64, producer: F) -> SharedOutcome
    where
        T: Serialize + Send + 'static,
        F: FnOnce(FlightHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();
        let handle = FlightHandle {
            inner: Arc::clone(&self.inner),
            key: owned_key.clone(),
            id: flight_id,
        };

        let task = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(async move { producer(handle).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(value)) => serde_json::to_value(value).map_err(PortalError::from),
                Ok(Err(err)) => Err(err),
                Err(_) => {
                    warn!(key = %owned_key, "request producer panicked");
                    Err(PortalError::Internal(format!(
                        "request for {} failed unexpectedly",
                        owned_key
                    )))
                }
            };
            inner.settle(&owned_key, flight_id, &outcome).await;
            outcome
        });

        async move {
            task.await.unwrap_or_else(|err| {
                Err(PortalError::Internal(format!("request task aborted: {}", err)))
            })
        }
        .boxed()
        .shared()
    }

    // == Forget ==
    /// Drops the memoized response and the in-flight registration for
    /// `key`. The next call starts a fresh producer.
    pub async fn forget(&self, key: &str) {
        let mut state = self.inner.state.lock().await;
        state.responses.remove(key);
        state.pending.remove(key);
        debug!(key, "request cache entry forgotten");
    }

    // == Clear All ==
    pub async fn clear_all(&self) {
        let mut state = self.inner.state.lock().await;
        state.responses.clear();
        state.pending.clear();
        info!("request cache cleared");
    }

    // == Cleanup ==
    /// Drops responses older than the window. Returns the number removed.
    pub async fn cleanup(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let window = self.inner.window_ms;
        let mut state = self.inner.state.lock().await;
        let before = state.responses.len();
        state
            .responses
            .retain(|_, cached| now.saturating_sub(cached.timestamp) < window);
        before - state.responses.len()
    }

    // == Introspection ==
    pub async fn is_pending(&self, key: &str) -> bool {
        self.inner.state.lock().await.pending.contains_key(key)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn response_count(&self) -> usize {
        self.inner.state.lock().await.responses.len()
    }
}

impl std::fmt::Debug for RequestDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("window_ms", &self.inner.window_ms)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|err| {
        PortalError::Internal(format!("response for {} has unexpected shape: {}", key, err))
    })
}
