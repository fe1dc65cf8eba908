//! Configuration Module
//!
//! Handles loading and managing service configuration from environment
//! variables. Every cache lifetime in the service is derived from this one
//! place through [`Config::ttl_policy`].

use std::env;
use std::path::PathBuf;

use crate::cache::TtlPolicy;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Freshness window of memoized responses in seconds
    pub response_window: u64,
    /// Lifetime of flat cache entries in seconds
    pub flat_cache_ttl: u64,
    /// TTL in seconds for layered cache types without an explicit entry
    pub default_ttl: u64,
    /// Key prefix owned by the layered cache in the persisted tier
    pub cache_prefix: String,
    /// Directory for the durable blob store; in-memory when unset
    pub blob_dir: Option<PathBuf>,
    /// Byte quota for the persisted tier; unbounded when unset
    pub persisted_quota_bytes: Option<usize>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    /// - `RESPONSE_WINDOW` - Response memo window in seconds (default: 300)
    /// - `FLAT_CACHE_TTL` - Flat cache lifetime in seconds (default: 86400)
    /// - `DEFAULT_TTL` - Fallback layered TTL in seconds (default: 86400)
    /// - `CACHE_PREFIX` - Layered cache key prefix (default: `portal_cache_`)
    /// - `BLOB_DIR` - Blob store directory (default: unset, in-memory)
    /// - `PERSISTED_QUOTA_BYTES` - Persisted tier quota (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_env("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            response_window: parse_env("RESPONSE_WINDOW").unwrap_or(defaults.response_window),
            flat_cache_ttl: parse_env("FLAT_CACHE_TTL").unwrap_or(defaults.flat_cache_ttl),
            default_ttl: parse_env("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            cache_prefix: env::var("CACHE_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.cache_prefix),
            blob_dir: env::var("BLOB_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            persisted_quota_bytes: parse_env("PERSISTED_QUOTA_BYTES"),
        }
    }

    /// Builds the policy table every cache tier reads its lifetimes from.
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::standard(secs_to_ms(self.default_ttl))
            .with_response_window(secs_to_ms(self.response_window))
            .with_flat_ttl(secs_to_ms(self.flat_cache_ttl))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 300,
            response_window: 300,
            flat_cache_ttl: 24 * 60 * 60,
            default_ttl: 24 * 60 * 60,
            cache_prefix: "portal_cache_".to_string(),
            blob_dir: None,
            persisted_quota_bytes: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}
