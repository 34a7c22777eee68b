//! Response DTOs for the cache sidecar API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheStats, CacheTier};
use crate::warming::WarmState;

/// Response body for GET /cache/entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
}

impl EntryResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /cache/entries
#[derive(Debug, Clone, Serialize)]
pub struct SetEntryResponse {
    /// Success message
    pub message: String,
    pub key: String,
    /// Tier the entry actually landed in
    pub tier: CacheTier,
}

impl SetEntryResponse {
    pub fn new(key: impl Into<String>, tier: CacheTier) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' stored in {} tier", key, tier),
            key,
            tier,
        }
    }
}

/// Response body for DELETE /cache/entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    /// Whether an entry was present
    pub deleted: bool,
}

/// Response body for pattern deletes, intents and events
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    /// Number of keys removed
    pub removed: usize,
}

/// Response body for POST /cache/clear
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Clear generation after this clear
    pub generation: u64,
}

/// Response body for GET /cache/stats
///
/// Counters and tier sizes, plus the derived hit rate and warm-up state.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Live entries across both tiers
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub warming: WarmState,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, warming: WarmState) -> Self {
        Self {
            total_entries: cache.total_entries(),
            hit_rate: cache.hit_rate(),
            cache,
            warming,
        }
    }
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

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_entry_response_serialize() {
        let resp = SetEntryResponse::new("categories:all", CacheTier::Persistent);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["tier"], "persistent");
        assert_eq!(json["key"], "categories:all");
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let mut stats = CacheStats::new();
        stats.memory_entries = 3;
        stats.persistent_entries = 1;
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let resp = StatsResponse::new(stats, WarmState::Ready { generation: 0 });
        assert_eq!(resp.total_entries, 4);
        assert!((resp.hit_rate - 0.75).abs() < 0.001);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["hits"], 3);
        assert_eq!(json["warming"], json!({"state": "ready", "generation": 0}));
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::new(CacheStats::new(), WarmState::Uninitialized);
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
