//! API Handlers
//!
//! HTTP request handlers for each sidecar endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, RawQuery, State},
    Json,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheManager, SharedCache, SharedClock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::invalidation::{DomainEvent, InvalidationRouter};
use crate::models::{
    ClearResponse, DeleteResponse, EntryResponse, HealthResponse, InvalidateRequest,
    PatternQuery, RemovedResponse, SetEntryRequest, SetEntryResponse, StatsResponse,
};
use crate::network::{
    HttpFetcher, InterceptedRequest, InterceptedResponse, NetworkWorker, WorkerCommand,
    WorkerHandle, WorkerReply,
};
use crate::upstream::UpstreamClient;
use crate::warming::{essential_prefetches, WarmOutcome, WarmingCoordinator};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache,
    pub invalidation: Arc<InvalidationRouter>,
    pub warming: Arc<WarmingCoordinator>,
    /// Sender side of the network worker
    pub worker: WorkerHandle,
}

impl AppState {
    /// Wires the invalidation router to the given cache and warming
    /// coordinator.
    pub fn new(cache: SharedCache, warming: Arc<WarmingCoordinator>, worker: WorkerHandle) -> Self {
        let invalidation =
            Arc::new(InvalidationRouter::new(cache.clone()).with_warming(warming.clone()));
        Self {
            cache,
            invalidation,
            warming,
            worker,
        }
    }

    /// Builds every component from configuration.
    ///
    /// Starts the network worker, precaches its static URLs and activates
    /// the configured bucket version. Also returns the worker task so the
    /// caller can stop it on shutdown.
    pub async fn from_config(config: &Config) -> Result<(Self, JoinHandle<()>)> {
        let clock: SharedClock = Arc::new(SystemClock);
        let cache = Arc::new(CacheManager::from_config(config, clock.clone()));

        let upstream = UpstreamClient::new(config.upstream_url.clone());
        let warming = Arc::new(WarmingCoordinator::new(
            cache.clone(),
            essential_prefetches(upstream),
        ));

        let fetcher = Arc::new(HttpFetcher::new(Some(config.upstream_url.clone())));
        let (worker, worker_task) = NetworkWorker::spawn(&config.network, fetcher, clock)?;
        worker.install(config.network.precache_urls.clone()).await?;
        worker.activate(config.network.version.clone()).await?;

        Ok((Self::new(cache, warming, worker), worker_task))
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats().await;
    Json(StatsResponse::new(stats, state.warming.state()))
}

/// Handler for PUT /cache/entries
///
/// Stores a JSON value. TTL and tier come from the request or its data class.
pub async fn set_entry_handler(
    State(state): State<AppState>,
    Json(req): Json<SetEntryRequest>,
) -> Result<Json<SetEntryResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let (ttl, tier) = req.placement(state.cache.ttl_policy());
    let stored_in = state.cache.set(&req.key, &req.value, ttl, tier).await?;

    Ok(Json(SetEntryResponse::new(req.key, stored_in)))
}

/// Handler for GET /cache/entries/:key
///
/// Plain lookup; there is no producer behind this route.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryResponse>> {
    let value = state
        .cache
        .peek(&key)
        .await
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(EntryResponse::new(key, value)))
}

/// Handler for DELETE /cache/entries/:key
pub async fn delete_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    let deleted = state.cache.delete(&key).await;
    Json(DeleteResponse { key, deleted })
}

/// Handler for DELETE /cache/entries?pattern=
pub async fn delete_pattern_handler(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<RemovedResponse>> {
    let removed = state.cache.delete_pattern(&query.pattern).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /cache/clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear().await;
    Json(ClearResponse {
        message: "Cache cleared".to_string(),
        generation: state.cache.generation(),
    })
}

/// Handler for POST /cache/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<RemovedResponse>> {
    let intent = req.into_intent()?;
    let removed = state.invalidation.invalidate(&intent).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /events
///
/// Applies the event before responding. Events published in-process go
/// through the cache's broadcast bus instead.
pub async fn event_handler(
    State(state): State<AppState>,
    Json(event): Json<DomainEvent>,
) -> Result<Json<RemovedResponse>> {
    let removed = state.invalidation.handle_event(&event).await?;
    debug!("Event {:?} removed {} keys", event.kind, removed);
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /cache/warm
pub async fn warm_handler(State(state): State<AppState>) -> Json<WarmOutcome> {
    Json(state.warming.warm_essential_data().await)
}

/// Handler for POST /worker/command
pub async fn worker_command_handler(
    State(state): State<AppState>,
    Json(command): Json<WorkerCommand>,
) -> Result<Json<WorkerReply>> {
    info!("Worker command {:?}", command);
    Ok(Json(state.worker.command(command).await?))
}

/// Handler for GET /fetch/*path
///
/// Sends the request through the network worker to the upstream origin.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<InterceptedResponse> {
    let url = match query {
        Some(query) => format!("/{}?{}", path, query),
        None => format!("/{}", path),
    };
    state.worker.fetch(InterceptedRequest::get(url)).await
}
