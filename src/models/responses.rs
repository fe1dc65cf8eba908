//! Response DTOs for the portal API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, FlatCacheStats};
use crate::storage::BlobStats;

/// Response body for GET /cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    pub layered: CacheStats,
    /// Hit rate of the layered cache across all tiers
    pub hit_rate: f64,
    pub flat: FlatCacheStats,
    pub blob: BlobStats,
    /// Memoized responses held by the request deduplicator
    pub memoized_responses: usize,
    /// Requests currently in flight
    pub pending_requests: usize,
}

/// Response body for cache clearing endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Entries removed
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(scope: &str, removed: usize) -> Self {
        Self {
            message: format!("Cleared {} cache", scope),
            removed,
        }
    }
}

/// Generic acknowledgement for writes
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for POST /courses
#[derive(Debug, Clone, Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

/// Response body for PUT /courses/:id/categories/:category/items
#[derive(Debug, Clone, Serialize)]
pub struct ItemsReplacedResponse {
    pub category: String,
    /// Items now stored under the category
    pub added: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
