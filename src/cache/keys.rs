//! Key Naming Module
//!
//! The fixed key convention shared by producers, warming and invalidation,
//! and the TTL policy per data class.
//!
//! | Data                 | Key                                  |
//! |----------------------|--------------------------------------|
//! | listing page         | `products:list:<page>[:<filters>]`   |
//! | product detail       | `products:detail:<id>`               |
//! | categories           | `categories:all`                     |
//! | global config        | `config:global`, `config:<name>`     |
//! | per-user data        | `user:<id>:<facet>`                  |
//! | vendor directory     | `vendors:list`                       |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheTier;

pub const PRODUCT_LIST_PATTERN: &str = "products:list:*";
pub const PRODUCT_DETAIL_PATTERN: &str = "products:detail:*";
pub const CATEGORIES_PATTERN: &str = "categories:*";
pub const CONFIG_PATTERN: &str = "config:*";
pub const ALL_USERS_PATTERN: &str = "user:*";

pub const CATEGORIES_KEY: &str = "categories:all";
pub const GLOBAL_CONFIG_KEY: &str = "config:global";

pub fn product_list(page: u32, filters: Option<&str>) -> String {
    match filters {
        Some(f) if !f.is_empty() => format!("products:list:{}:{}", page, f),
        _ => format!("products:list:{}", page),
    }
}

pub fn product_detail(id: &str) -> String {
    format!("products:detail:{}", id)
}

pub fn user_pattern(id: &str) -> String {
    format!("user:{}:*", id)
}

// == Data Class ==
/// Freshness class a caller picks instead of a raw TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    /// Frequently changing listings
    Listings,
    /// Single product/vendor detail pages
    Details,
    /// Near-static reference data: categories, config
    Reference,
    /// Data scoped to the signed-in user
    User,
}

impl DataClass {
    /// Reference data survives restarts; everything else is memory-only.
    pub fn tier(&self) -> CacheTier {
        match self {
            DataClass::Reference => CacheTier::Persistent,
            _ => CacheTier::Memory,
        }
    }
}

// == TTL Policy ==
/// TTL per data class.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    pub listings: Duration,
    pub details: Duration,
    pub reference: Duration,
    pub user: Duration,
}

impl TtlPolicy {
    pub fn ttl_for(&self, class: DataClass) -> Duration {
        match class {
            DataClass::Listings => self.listings,
            DataClass::Details => self.details,
            DataClass::Reference => self.reference,
            DataClass::User => self.user,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            listings: Duration::from_secs(5 * 60),
            details: Duration::from_secs(10 * 60),
            reference: Duration::from_secs(60 * 60),
            user: Duration::from_secs(15 * 60),
        }
    }
}
