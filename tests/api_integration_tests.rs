//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycles against the router, sharing one state
//! across requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use storefront_cache::api::{create_router, AppState};
use storefront_cache::cache::{CacheManager, DataClass, EntryStore, ManualClock, TtlPolicy};
use storefront_cache::network::{
    FetchError, Fetcher, InterceptedRequest, InterceptedResponse, NetworkConfig, NetworkWorker,
};
use storefront_cache::warming::{Prefetch, WarmingCoordinator};
use tower::ServiceExt;

// == Helper Functions ==

/// Serves fixed bodies by URL; unknown URLs are network failures.
#[derive(Default)]
struct StaticOrigin {
    routes: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl Fetcher for StaticOrigin {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, FetchError> {
        match self.routes.lock().unwrap().get(&request.url) {
            Some(body) => Ok(InterceptedResponse::new(200, body.clone())),
            None => Err(FetchError::Network("connection refused".into())),
        }
    }
}

async fn create_test_app() -> (Router, Arc<StaticOrigin>) {
    let clock = Arc::new(ManualClock::new(0));
    let cache = Arc::new(CacheManager::new(
        EntryStore::in_memory(10, clock.clone()),
        TtlPolicy::default(),
    ));
    let warming = Arc::new(WarmingCoordinator::new(
        cache.clone(),
        vec![Prefetch::new("categories", "categories:all", DataClass::Reference, || async {
            anyhow::Ok(json!(["shoes", "hats"]))
        })],
    ));

    let origin = Arc::new(StaticOrigin::default());
    let (worker, _task) =
        NetworkWorker::spawn(&NetworkConfig::default(), origin.clone(), clock).unwrap();
    worker.activate("v1").await.unwrap();

    (create_router(AppState::new(cache, warming, worker)), origin)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn body_to_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn put_entry(app: &Router, key: &str, value: Value) {
    let response = send(
        app,
        "PUT",
        "/cache/entries",
        Some(json!({"key": key, "value": value, "ttl_ms": 60_000})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// == Entry Tests ==

#[tokio::test]
async fn test_set_then_get_roundtrip() {
    let (app, _) = create_test_app().await;
    put_entry(&app, "products:detail:p1", json!({"name": "Lamp", "price": 12})).await;

    let response = send(&app, "GET", "/cache/entries/products:detail:p1", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response).await;
    assert_eq!(json["key"], "products:detail:p1");
    assert_eq!(json["value"]["price"], 12);
}

#[tokio::test]
async fn test_reference_class_goes_to_persistent_tier() {
    let (app, _) = create_test_app().await;

    let response = send(
        &app,
        "PUT",
        "/cache/entries",
        Some(json!({"key": "config:global", "value": {"theme": "dark"}, "class": "reference"})),
    )
    .await;
    let json = body_to_json(response).await;
    assert_eq!(json["tier"], "persistent");

    let stats = body_to_json(send(&app, "GET", "/cache/stats", None).await).await;
    assert_eq!(stats["persistent_entries"], 1);
    assert_eq!(stats["memory_entries"], 0);
}

#[tokio::test]
async fn test_set_rejects_empty_key() {
    let (app, _) = create_test_app().await;
    let response = send(
        &app,
        "PUT",
        "/cache/entries",
        Some(json!({"key": "", "value": 1, "ttl_ms": 10})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_delete_by_key_and_pattern() {
    let (app, _) = create_test_app().await;
    for key in ["user:42:profile", "user:42:orders", "user:7:profile"] {
        put_entry(&app, key, json!(key)).await;
    }

    let response = send(&app, "DELETE", "/cache/entries?pattern=user:42:*", None).await;
    let json = body_to_json(response).await;
    assert_eq!(json["removed"], 2);

    let response = send(&app, "DELETE", "/cache/entries/user:7:profile", None).await;
    let json = body_to_json(response).await;
    assert_eq!(json["deleted"], true);

    let response = send(&app, "GET", "/cache/entries/user:7:profile", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// == Invalidation Tests ==

#[tokio::test]
async fn test_invalidate_product_intent() {
    let (app, _) = create_test_app().await;
    for key in ["products:detail:p1", "products:detail:p2", "products:list:1"] {
        put_entry(&app, key, json!(key)).await;
    }

    let response = send(
        &app,
        "POST",
        "/cache/invalidate",
        Some(json!({"intent": "product", "id": "p1"})),
    )
    .await;
    assert_eq!(body_to_json(response).await["removed"], 2);

    let response = send(&app, "GET", "/cache/entries/products:detail:p2", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_vendor_status_event_drops_catalog() {
    let (app, _) = create_test_app().await;
    for key in ["products:detail:p1", "products:list:1", "categories:all"] {
        put_entry(&app, key, json!(key)).await;
    }

    let response = send(
        &app,
        "POST",
        "/events",
        Some(json!({"type": "vendor_status_changed", "detail": {"vendorId": "v9"}})),
    )
    .await;
    assert_eq!(body_to_json(response).await["removed"], 2);

    let stats = body_to_json(send(&app, "GET", "/cache/stats", None).await).await;
    assert_eq!(stats["total_entries"], 1);
}

#[tokio::test]
async fn test_logout_event_clears_and_rearms_warming() {
    let (app, _) = create_test_app().await;

    let warm = body_to_json(send(&app, "POST", "/cache/warm", None).await).await;
    assert_eq!(warm["outcome"], "completed");
    assert_eq!(warm["warmed"], json!(["categories"]));

    let again = body_to_json(send(&app, "POST", "/cache/warm", None).await).await;
    assert_eq!(again["outcome"], "already_warm");

    send(&app, "POST", "/events", Some(json!({"type": "logout_started"}))).await;

    let stats = body_to_json(send(&app, "GET", "/cache/stats", None).await).await;
    assert_eq!(stats["total_entries"], 0);
    assert_eq!(stats["warming"]["state"], "uninitialized");

    let rewarm = body_to_json(send(&app, "POST", "/cache/warm", None).await).await;
    assert_eq!(rewarm["outcome"], "completed");
}

#[tokio::test]
async fn test_clear_bumps_generation() {
    let (app, _) = create_test_app().await;
    put_entry(&app, "vendors:list", json!([])).await;

    let json = body_to_json(send(&app, "POST", "/cache/clear", None).await).await;
    assert_eq!(json["generation"], 1);

    let response = send(&app, "GET", "/cache/entries/vendors:list", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// == Network Worker Tests ==

#[tokio::test]
async fn test_fetch_static_asset_cached_and_served_offline() {
    let (app, origin) = create_test_app().await;
    origin
        .routes
        .lock()
        .unwrap()
        .insert("/assets/app.css".into(), "body{}".into());

    let first = send(&app, "GET", "/fetch/assets/app.css", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache-source"], "network");

    origin.routes.lock().unwrap().clear();

    let second = send(&app, "GET", "/fetch/assets/app.css", None).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache-source"], "cache");

    let missing = send(&app, "GET", "/fetch/assets/other.css", None).await;
    assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(missing.headers()["x-cache-source"], "offline");
}

#[tokio::test]
async fn test_fetch_api_without_cache_is_structured_failure() {
    let (app, _) = create_test_app().await;

    let response = send(&app, "GET", "/fetch/api/products?page=1", None).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(
        body_to_json(response).await,
        json!({"error": "network_unavailable", "cached": false})
    );
}

#[tokio::test]
async fn test_worker_command_channel() {
    let (app, origin) = create_test_app().await;
    origin
        .routes
        .lock()
        .unwrap()
        .insert("/images/p1.png".into(), "png".into());
    send(&app, "GET", "/fetch/images/p1.png", None).await;

    let stats = body_to_json(
        send(&app, "POST", "/worker/command", Some(json!({"type": "GET_CACHE_STATS"}))).await,
    )
    .await;
    assert_eq!(stats, json!({"stats": {"images-v1": 1}}));

    let ack = body_to_json(
        send(
            &app,
            "POST",
            "/worker/command",
            Some(json!({"type": "CLEAR_CACHE", "cacheType": "all"})),
        )
        .await,
    )
    .await;
    assert_eq!(ack, json!({"success": true}));

    let stats = body_to_json(
        send(&app, "POST", "/worker/command", Some(json!({"type": "GET_CACHE_STATS"}))).await,
    )
    .await;
    assert_eq!(stats, json!({"stats": {}}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_app().await;
    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response).await;
    assert_eq!(json["status"], "healthy");
}
