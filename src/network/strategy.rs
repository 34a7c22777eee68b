//! Caching strategies
//!
//! - static assets and images: cache-first, offline placeholder on failure
//! - API resources: network-first, cached copy served for a bounded time
//!   when the network fails
//! - everything else: straight to the network

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::cache::SharedClock;
use crate::error::Result;
use crate::network::{
    BucketStore, Fetcher, InterceptedRequest, InterceptedResponse, NetworkConfig,
    RequestClassifier, ResourceClass, ResponseSource,
};

/// Header carrying the store time of an API response.
const CACHED_AT_HEADER: &str = "x-cached-at";

/// Applies the per-class strategy to one request. Cheap to clone; clones
/// share the same buckets.
#[derive(Clone)]
pub struct Interceptor {
    classifier: Arc<RequestClassifier>,
    buckets: Arc<Mutex<BucketStore>>,
    fetcher: Arc<dyn Fetcher>,
    clock: SharedClock,
    api_fallback_ttl: Duration,
}

impl Interceptor {
    pub fn new(
        config: &NetworkConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: SharedClock,
    ) -> Result<Self> {
        Ok(Self {
            classifier: Arc::new(RequestClassifier::new(config)?),
            buckets: Arc::new(Mutex::new(BucketStore::new(config.version.clone()))),
            fetcher,
            clock,
            api_fallback_ttl: config.api_fallback_ttl,
        })
    }

    pub(crate) fn buckets(&self) -> MutexGuard<'_, BucketStore> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn classify(&self, request: &InterceptedRequest) -> ResourceClass {
        self.classifier.classify(&request.method, &request.url)
    }

    // == Handle ==
    /// Answers one request. Network failures come back as responses.
    pub async fn handle(&self, request: InterceptedRequest) -> InterceptedResponse {
        let class = self.classify(&request);
        debug!("{} {} classified as {}", request.method, request.url, class);

        match class {
            ResourceClass::StaticAsset | ResourceClass::Image => {
                self.cache_first(class, &request).await
            }
            ResourceClass::ApiResource => self.network_first(&request).await,
            ResourceClass::Uncached => self.pass_through(&request).await,
        }
    }

    async fn cache_first(
        &self,
        class: ResourceClass,
        request: &InterceptedRequest,
    ) -> InterceptedResponse {
        let id = request.cache_id();
        let version = {
            let buckets = self.buckets();
            if let Some(hit) = buckets.lookup(class, &id) {
                debug!("Bucket hit for {}", id);
                return hit.with_source(ResponseSource::Cache);
            }
            buckets.version().to_string()
        };

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.buckets().store(class, &version, &id, response.clone());
                }
                response
            }
            Err(e) => {
                warn!("Fetch of {} failed, serving offline placeholder: {}", id, e);
                InterceptedResponse::offline()
            }
        }
    }

    async fn network_first(&self, request: &InterceptedRequest) -> InterceptedResponse {
        let class = ResourceClass::ApiResource;
        let id = request.cache_id();
        let version = self.buckets().version().to_string();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    let now = self.clock.now_ms();
                    let mut stamped = response
                        .clone()
                        .with_header(CACHED_AT_HEADER, now.to_string());
                    stamped.cached_at = Some(now);
                    self.buckets().store(class, &version, &id, stamped);
                }
                response
            }
            Err(e) => {
                let now = self.clock.now_ms();
                let ttl_ms = u64::try_from(self.api_fallback_ttl.as_millis()).unwrap_or(u64::MAX);
                let mut buckets = self.buckets();

                match buckets.lookup(class, &id) {
                    Some(cached)
                        if cached
                            .cached_at
                            .is_some_and(|at| now.saturating_sub(at) <= ttl_ms) =>
                    {
                        info!("Network failed for {}, serving cached copy: {}", id, e);
                        cached.stale()
                    }
                    Some(_) => {
                        warn!("Network failed for {}, cached copy too old: {}", id, e);
                        buckets.purge(class, &id);
                        InterceptedResponse::unavailable()
                    }
                    None => {
                        warn!("Network failed for {}, nothing cached: {}", id, e);
                        InterceptedResponse::unavailable()
                    }
                }
            }
        }
    }

    pub(crate) async fn pass_through(&self, request: &InterceptedRequest) -> InterceptedResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Uncached fetch of {} failed: {}", request.url, e);
                InterceptedResponse::json(
                    502,
                    &json!({ "error": "network_error", "message": e.to_string() }),
                )
                .with_source(ResponseSource::Unavailable)
            }
        }
    }

    /// Fetches `urls` into the current static bucket. Failures are logged and
    /// skipped. Returns how many were stored.
    pub async fn precache(&self, urls: &[String]) -> usize {
        let version = self.buckets().version().to_string();
        let fetches = urls.iter().map(|url| async move {
            let request = InterceptedRequest::get(url.as_str());
            match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => Some((request.cache_id(), response)),
                Ok(response) => {
                    warn!("Precache of {} returned {}", url, response.status);
                    None
                }
                Err(e) => {
                    warn!("Precache of {} failed: {}", url, e);
                    None
                }
            }
        });
        let fetched = futures::future::join_all(fetches).await;

        let mut buckets = self.buckets();
        let mut stored = 0;
        for (id, response) in fetched.into_iter().flatten() {
            if buckets.store(ResourceClass::StaticAsset, &version, &id, response) {
                stored += 1;
            }
        }
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::network::testing::ScriptedFetcher;
    use crate::network::FALLBACK_HEADER;

    fn setup() -> (Interceptor, Arc<ScriptedFetcher>, Arc<ManualClock>) {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let clock = Arc::new(ManualClock::new(1_000));
        let interceptor =
            Interceptor::new(&NetworkConfig::default(), fetcher.clone(), clock.clone()).unwrap();
        (interceptor, fetcher, clock)
    }

    #[tokio::test]
    async fn test_static_cache_first() {
        let (interceptor, fetcher, _) = setup();
        fetcher.route("/assets/app.js", 200, "console.log(1)");

        let first = interceptor.handle(InterceptedRequest::get("/assets/app.js")).await;
        let second = interceptor.handle(InterceptedRequest::get("/assets/app.js")).await;

        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body, "console.log(1)");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_static_error_status_not_stored() {
        let (interceptor, fetcher, _) = setup();

        let response = interceptor.handle(InterceptedRequest::get("/assets/gone.js")).await;
        assert_eq!(response.status, 404);
        interceptor.handle(InterceptedRequest::get("/assets/gone.js")).await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_image_offline_placeholder() {
        let (interceptor, fetcher, _) = setup();
        fetcher.set_offline(true);

        let response = interceptor.handle(InterceptedRequest::get("/images/p1.jpg")).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Offline);
    }

    #[tokio::test]
    async fn test_api_fallback_within_window() {
        let (interceptor, fetcher, clock) = setup();
        fetcher.route("/api/categories", 200, "[\"shoes\"]");

        let live = interceptor.handle(InterceptedRequest::get("/api/categories")).await;
        assert_eq!(live.source, ResponseSource::Network);
        assert_eq!(live.cached_at, None);

        fetcher.set_offline(true);
        clock.advance(Duration::from_secs(300));

        let fallback = interceptor.handle(InterceptedRequest::get("/api/categories")).await;
        assert_eq!(fallback.status, 200);
        assert_eq!(fallback.source, ResponseSource::StaleCache);
        assert_eq!(fallback.header(FALLBACK_HEADER), Some("stale"));
        assert_eq!(fallback.body, "[\"shoes\"]");
    }

    #[tokio::test]
    async fn test_api_fallback_expired_purges() {
        let (interceptor, fetcher, clock) = setup();
        fetcher.route("/api/config", 200, "{}");
        interceptor.handle(InterceptedRequest::get("/api/config")).await;

        fetcher.set_offline(true);
        clock.advance(Duration::from_millis(300_001));

        let failed = interceptor.handle(InterceptedRequest::get("/api/config")).await;
        assert_eq!(failed.status, 504);
        assert_eq!(failed.source, ResponseSource::Unavailable);
        assert_eq!(interceptor.buckets().stats()["api-v1"], 0);
    }

    #[tokio::test]
    async fn test_api_network_always_wins_when_online() {
        let (interceptor, fetcher, _) = setup();
        fetcher.route("/api/config", 200, "old");
        interceptor.handle(InterceptedRequest::get("/api/config")).await;
        fetcher.route("/api/config", 200, "new");

        let response = interceptor.handle(InterceptedRequest::get("/api/config")).await;
        assert_eq!(response.body, "new");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_api_error_status_returned_unchanged() {
        let (interceptor, fetcher, _) = setup();
        fetcher.route("/api/products", 500, "boom");

        let response = interceptor.handle(InterceptedRequest::get("/api/products")).await;
        assert_eq!(response.status, 500);
        assert!(interceptor.buckets().stats().is_empty());
    }

    #[tokio::test]
    async fn test_uncached_passes_through() {
        let (interceptor, fetcher, _) = setup();
        fetcher.route("/api/orders", 201, "created");

        let request = InterceptedRequest::new("POST", "/api/orders");
        let response = interceptor.handle(request.clone()).await;
        assert_eq!(response.status, 201);
        interceptor.handle(request).await;
        assert_eq!(fetcher.calls(), 2);
        assert!(interceptor.buckets().stats().is_empty());

        fetcher.set_offline(true);
        let failed = interceptor.handle(InterceptedRequest::get("/api/orders")).await;
        assert_eq!(failed.status, 502);
    }

    #[tokio::test]
    async fn test_precache_skips_failures() {
        let (interceptor, fetcher, _) = setup();
        fetcher.route("/index.html", 200, "<html>");

        let stored = interceptor
            .precache(&["/index.html".to_string(), "/missing.html".to_string()])
            .await;
        assert_eq!(stored, 1);

        fetcher.set_offline(true);
        let cached = interceptor.handle(InterceptedRequest::get("/index.html")).await;
        assert_eq!(cached.source, ResponseSource::Cache);
    }
}
