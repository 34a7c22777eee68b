//! Network Interception Module
//!
//! A worker that sits in front of outbound requests and answers them from its
//! own versioned buckets according to the request's resource class:
//! cache-first for static assets and images, network-first with a bounded
//! stale fallback for API resources, pass-through for everything else.
//!
//! The worker shares nothing with the cache manager. It runs as a task and is
//! reached only through a [`WorkerHandle`].

mod bucket;
mod classify;
mod fetcher;
mod messages;
mod strategy;
#[cfg(test)]
pub(crate) mod testing;
mod worker;

use std::time::Duration;

pub use bucket::BucketStore;
pub use classify::{RequestClassifier, ResourceClass};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use messages::{
    CacheTarget, InterceptedRequest, InterceptedResponse, ResponseSource, WorkerCommand,
    WorkerReply,
};
pub use strategy::Interceptor;
pub use worker::{Activation, NetworkWorker, WorkerHandle};

/// Header set on API responses served from the stale fallback.
pub const FALLBACK_HEADER: &str = "x-cache-fallback";

/// Header naming where an intercepted response came from.
pub const SOURCE_HEADER: &str = "x-cache-source";

/// Classification inputs and bucket versioning for the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Version tag baked into bucket names
    pub version: String,
    /// Maximum age of an API response served when the network fails
    pub api_fallback_ttl: Duration,
    pub static_suffixes: Vec<String>,
    pub static_prefixes: Vec<String>,
    /// Regular expressions matched against the URL path
    pub api_patterns: Vec<String>,
    pub image_extensions: Vec<String>,
    pub image_path_patterns: Vec<String>,
    /// Static URLs stored at install time
    pub precache_urls: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            api_fallback_ttl: Duration::from_secs(300),
            static_suffixes: strings(&[".js", ".css", ".html"]),
            static_prefixes: strings(&["/assets/", "/static/"]),
            api_patterns: strings(&[
                r"^/api/categories",
                r"^/api/config",
                r"^/api/products",
                r"^/api/vendors",
                r"^/rest/v1/",
            ]),
            image_extensions: strings(&[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".avif"]),
            image_path_patterns: strings(&["/storage/v1/object/", "/images/"]),
            precache_urls: strings(&["/index.html"]),
        }
    }
}
