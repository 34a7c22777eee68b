//! Prefetch definitions
//!
//! A prefetch is a named read-through of one canonical key. Running it
//! populates the cache the same way an ordinary `get` would.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{keys, DataClass};
use crate::upstream::UpstreamClient;

type ProducerFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// One named prefetch.
#[derive(Clone)]
pub struct Prefetch {
    pub name: String,
    pub key: String,
    pub class: DataClass,
    producer: ProducerFn,
}

impl Prefetch {
    /// Wraps a zero-argument async producer.
    pub fn new<F, Fut, T>(
        name: impl Into<String>,
        key: impl Into<String>,
        class: DataClass,
        f: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + 'static,
    {
        let producer: ProducerFn = Arc::new(move || {
            f().map(|result| result.and_then(|v| Ok(serde_json::to_value(v)?)))
                .boxed()
        });
        Self {
            name: name.into(),
            key: key.into(),
            class,
            producer,
        }
    }

    /// Starts one run of the producer.
    pub fn produce(&self) -> BoxFuture<'static, anyhow::Result<Value>> {
        (self.producer)()
    }
}

impl fmt::Debug for Prefetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prefetch")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("class", &self.class)
            .finish()
    }
}

/// The storefront's hot-path data, in warm order: categories, the first page
/// of active listings, then global config.
pub fn essential_prefetches(upstream: UpstreamClient) -> Vec<Prefetch> {
    let categories = upstream.clone();
    let listings = upstream.clone();
    let config = upstream;

    vec![
        Prefetch::new("categories", keys::CATEGORIES_KEY, DataClass::Reference, move || {
            let upstream = categories.clone();
            async move { upstream.fetch_json("/api/categories").await }
        }),
        Prefetch::new(
            "active-listings",
            keys::product_list(1, None),
            DataClass::Listings,
            move || {
                let upstream = listings.clone();
                async move { upstream.fetch_json("/api/products?page=1&status=active").await }
            },
        ),
        Prefetch::new("global-config", keys::GLOBAL_CONFIG_KEY, DataClass::Reference, move || {
            let upstream = config.clone();
            async move { upstream.fetch_json("/api/config").await }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_prefetch_serializes_output() {
        let prefetch = Prefetch::new("n", "k", DataClass::Listings, || async {
            anyhow::Ok(vec![1, 2, 3])
        });
        assert_eq!(prefetch.produce().await.unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_essential_order_and_keys() {
        let prefetches = essential_prefetches(UpstreamClient::new("http://localhost:1"));
        let names: Vec<&str> = prefetches.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["categories", "active-listings", "global-config"]);
        assert_eq!(prefetches[1].key, "products:list:1");
        assert_eq!(prefetches[0].class, DataClass::Reference);
    }
}
