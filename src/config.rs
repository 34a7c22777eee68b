//! Configuration Module
//!
//! Handles loading and managing cache and sidecar configuration from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::TtlPolicy;
use crate::network::NetworkConfig;

/// Sidecar configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Origin that producers and the interception layer fetch from
    pub upstream_url: String,
    /// Maximum number of items the persistent tier may hold
    pub persistent_max_items: usize,
    /// File backing the persistent tier; None keeps it in process memory
    pub persistent_path: Option<PathBuf>,
    /// Byte quota of the persistent tier
    pub persistent_quota_bytes: usize,
    /// Versioned prefix every persistent item is stored under
    pub storage_namespace: String,
    /// TTLs per data class
    pub ttl: TtlPolicy,
    /// Background sweep interval in seconds
    pub cleanup_interval: u64,
    /// Interception layer settings
    pub network: NetworkConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Data origin (default: http://127.0.0.1:8080)
    /// - `PERSISTENT_MAX_ITEMS` - Persistent tier bound (default: 100)
    /// - `PERSISTENT_PATH` - JSON file for the persistent tier (default: unset)
    /// - `PERSISTENT_QUOTA_BYTES` - Persistent tier quota (default: 5 MiB)
    /// - `STORAGE_NAMESPACE` - Persistent key prefix (default: storefront_cache_v1)
    /// - `TTL_LISTINGS_SECS`, `TTL_DETAILS_SECS`, `TTL_REFERENCE_SECS`, `TTL_USER_SECS`
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `WORKER_CACHE_VERSION` - Network bucket version tag (default: v1)
    /// - `API_FALLBACK_TTL_SECS` - Max age of stale API fallbacks (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ttl = TtlPolicy {
            listings: secs_var("TTL_LISTINGS_SECS").unwrap_or(defaults.ttl.listings),
            details: secs_var("TTL_DETAILS_SECS").unwrap_or(defaults.ttl.details),
            reference: secs_var("TTL_REFERENCE_SECS").unwrap_or(defaults.ttl.reference),
            user: secs_var("TTL_USER_SECS").unwrap_or(defaults.ttl.user),
        };

        let mut network = defaults.network;
        if let Ok(version) = env::var("WORKER_CACHE_VERSION") {
            network.version = version;
        }
        if let Some(ttl) = secs_var("API_FALLBACK_TTL_SECS") {
            network.api_fallback_ttl = ttl;
        }

        Self {
            server_port: parsed_var("SERVER_PORT").unwrap_or(defaults.server_port),
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            persistent_max_items: parsed_var("PERSISTENT_MAX_ITEMS")
                .unwrap_or(defaults.persistent_max_items),
            persistent_path: env::var("PERSISTENT_PATH").ok().map(PathBuf::from),
            persistent_quota_bytes: parsed_var("PERSISTENT_QUOTA_BYTES")
                .unwrap_or(defaults.persistent_quota_bytes),
            storage_namespace: env::var("STORAGE_NAMESPACE")
                .unwrap_or(defaults.storage_namespace),
            ttl,
            cleanup_interval: parsed_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            network,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            upstream_url: "http://127.0.0.1:8080".to_string(),
            persistent_max_items: 100,
            persistent_path: None,
            persistent_quota_bytes: 5 * 1024 * 1024,
            storage_namespace: "storefront_cache_v1".to_string(),
            ttl: TtlPolicy::default(),
            cleanup_interval: 60,
            network: NetworkConfig::default(),
        }
    }
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn secs_var(name: &str) -> Option<Duration> {
    parsed_var::<u64>(name).map(Duration::from_secs)
}
