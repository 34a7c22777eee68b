//! Domain events
//!
//! Typed `{ type, detail }` notifications that drive reactive invalidation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(alias = "logoutStarted")]
    LogoutStarted,
    #[serde(alias = "productMutated")]
    ProductMutated,
    #[serde(alias = "vendorStatusChanged")]
    VendorStatusChanged,
    #[serde(alias = "configChanged")]
    ConfigChanged,
    #[serde(alias = "userUpdated")]
    UserUpdated,
    #[serde(alias = "categoriesChanged")]
    CategoriesChanged,
}

/// A domain event with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub detail: Value,
}

impl DomainEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            detail: Value::Null,
        }
    }

    pub fn with_detail(kind: EventKind, detail: Value) -> Self {
        Self { kind, detail }
    }

    /// String field of the payload, accepting camelCase or snake_case names.
    pub fn detail_str(&self, camel: &str, snake: &str) -> Option<&str> {
        self.detail
            .get(camel)
            .or_else(|| self.detail.get(snake))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn product_id(&self) -> Option<&str> {
        self.detail_str("productId", "product_id")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.detail_str("userId", "user_id")
    }
}
