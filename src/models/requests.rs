//! Request DTOs for the cache sidecar API
//!
//! Defines the structure of incoming HTTP request bodies and queries.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{CacheTier, DataClass, TtlPolicy, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};
use crate::invalidation::InvalidationIntent;

/// Request body for PUT /cache/entries
///
/// # Fields
/// - `key`: Canonical cache key
/// - `value`: Any JSON value
/// - `ttl_ms`: Explicit TTL in milliseconds
/// - `tier`: Explicit tier (`memory` or `persistent`)
/// - `class`: Data class supplying TTL and tier when those are omitted
#[derive(Debug, Clone, Deserialize)]
pub struct SetEntryRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub tier: Option<CacheTier>,
    #[serde(default)]
    pub class: Option<DataClass>,
}

impl SetEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        if self.ttl_ms.is_none() && self.class.is_none() {
            return Some("Either ttl_ms or class is required".to_string());
        }
        if self.ttl_ms == Some(0) {
            return Some("ttl_ms must be positive".to_string());
        }
        None
    }

    /// TTL and tier to write with. Explicit fields win over the class.
    pub fn placement(&self, policy: &TtlPolicy) -> (Duration, CacheTier) {
        let class_ttl = self.class.map(|class| policy.ttl_for(class));
        let ttl = self
            .ttl_ms
            .map(Duration::from_millis)
            .or(class_ttl)
            .unwrap_or(policy.listings);
        let tier = self
            .tier
            .or(self.class.map(|class| class.tier()))
            .unwrap_or_default();
        (ttl, tier)
    }
}

/// Named intents accepted by POST /cache/invalidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentName {
    Products,
    Product,
    ProductDetails,
    User,
    Users,
    Config,
    Categories,
}

/// Request body for POST /cache/invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub intent: IntentName,
    #[serde(default)]
    pub id: Option<String>,
}

impl InvalidateRequest {
    /// Resolves to an intent. `product` and `user` need an id.
    pub fn into_intent(self) -> Result<InvalidationIntent> {
        let id = self.id.filter(|id| !id.is_empty());
        let intent = match (self.intent, id) {
            (IntentName::Products, _) => InvalidationIntent::Products,
            (IntentName::Product, Some(id)) => InvalidationIntent::ProductById(id),
            (IntentName::ProductDetails, _) => InvalidationIntent::AllProductDetails,
            (IntentName::User, Some(id)) => InvalidationIntent::User(Some(id)),
            (IntentName::Users, _) => InvalidationIntent::User(None),
            (IntentName::Config, _) => InvalidationIntent::Config,
            (IntentName::Categories, _) => InvalidationIntent::Categories,
            (IntentName::Product | IntentName::User, None) => {
                return Err(CacheError::InvalidRequest(format!(
                    "Intent {:?} requires an id",
                    self.intent
                )))
            }
        };
        Ok(intent)
    }
}

/// Query for DELETE /cache/entries
#[derive(Debug, Clone, Deserialize)]
pub struct PatternQuery {
    pub pattern: String,
}
