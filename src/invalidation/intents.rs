//! Invalidation intents
//!
//! Named purge operations. Callers say what changed; the intent knows which
//! keys that touches.

use std::fmt;

use crate::cache::keys;

/// What a caller wants forgotten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationIntent {
    /// Every listing page
    Products,
    /// One product's detail, plus the listings that may show it
    ProductById(String),
    AllProductDetails,
    /// One user's data, or every user's when `None`
    User(Option<String>),
    Config,
    Categories,
}

/// A concrete purge the cache performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeTarget {
    Key(String),
    Pattern(String),
}

impl InvalidationIntent {
    /// Resolves the intent against the key-naming convention.
    pub fn targets(&self) -> Vec<PurgeTarget> {
        match self {
            InvalidationIntent::Products => {
                vec![PurgeTarget::Pattern(keys::PRODUCT_LIST_PATTERN.to_string())]
            }
            InvalidationIntent::ProductById(id) => vec![
                PurgeTarget::Key(keys::product_detail(id)),
                PurgeTarget::Pattern(keys::PRODUCT_LIST_PATTERN.to_string()),
            ],
            InvalidationIntent::AllProductDetails => {
                vec![PurgeTarget::Pattern(keys::PRODUCT_DETAIL_PATTERN.to_string())]
            }
            InvalidationIntent::User(Some(id)) => {
                vec![PurgeTarget::Pattern(keys::user_pattern(id))]
            }
            InvalidationIntent::User(None) => {
                vec![PurgeTarget::Pattern(keys::ALL_USERS_PATTERN.to_string())]
            }
            InvalidationIntent::Config => {
                vec![PurgeTarget::Pattern(keys::CONFIG_PATTERN.to_string())]
            }
            InvalidationIntent::Categories => {
                vec![PurgeTarget::Pattern(keys::CATEGORIES_PATTERN.to_string())]
            }
        }
    }
}

impl fmt::Display for InvalidationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationIntent::Products => write!(f, "products"),
            InvalidationIntent::ProductById(id) => write!(f, "product {}", id),
            InvalidationIntent::AllProductDetails => write!(f, "all product details"),
            InvalidationIntent::User(Some(id)) => write!(f, "user {}", id),
            InvalidationIntent::User(None) => write!(f, "all users"),
            InvalidationIntent::Config => write!(f, "config"),
            InvalidationIntent::Categories => write!(f, "categories"),
        }
    }
}
