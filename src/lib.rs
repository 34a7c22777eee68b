//! Storefront Cache - two-tier client cache for a marketplace storefront
//!
//! A read-through cache manager with TTLs, a bounded persistent tier, request
//! coalescing, cache warming and intent-based invalidation, plus a versioned
//! request-interception worker. A small axum sidecar exposes both over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod network;
pub mod tasks;
pub mod upstream;
pub mod warming;

pub use api::AppState;
pub use cache::{CacheManager, SharedCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{spawn_event_listener, InvalidationRouter};
pub use tasks::spawn_cleanup_task;
