//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Tier ==
/// Where an entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Process memory; gone after restart
    #[default]
    Memory,
    /// Durable storage, bounded by an item count
    Persistent,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "memory"),
            CacheTier::Persistent => write!(f, "persistent"),
        }
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The entry key
    pub key: String,
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), always `created_at + ttl`
    pub expires_at: u64,
    /// Tier the entry was written to
    pub tier: CacheTier,
    /// Write sequence, used to order entries that expire at the same instant
    #[serde(default)]
    pub seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `key` - The entry key
    /// * `value` - The value to store
    /// * `now_ms` - Creation time
    /// * `ttl` - Lifetime of the entry
    /// * `tier` - Target tier
    pub fn new(key: String, value: Value, now_ms: u64, ttl: Duration, tier: CacheTier) -> Self {
        Self {
            key,
            value,
            created_at: now_ms,
            expires_at: now_ms.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            tier,
            seq: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `now >= expires_at`, so a TTL that has fully
    /// elapsed never yields a value.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}
