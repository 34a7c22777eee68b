//! API Routes
//!
//! Configures the Axum router with all sidecar endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_entry_handler, delete_pattern_handler, event_handler, fetch_handler,
    get_entry_handler, health_handler, invalidate_handler, set_entry_handler, stats_handler,
    warm_handler, worker_command_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/cache/stats", get(stats_handler))
        .route(
            "/cache/entries",
            put(set_entry_handler).delete(delete_pattern_handler),
        )
        .route(
            "/cache/entries/:key",
            get(get_entry_handler).delete(delete_entry_handler),
        )
        .route("/cache/clear", post(clear_handler))
        .route("/cache/invalidate", post(invalidate_handler))
        .route("/cache/warm", post(warm_handler))
        .route("/events", post(event_handler))
        .route("/worker/command", post(worker_command_handler))
        .route("/fetch/*path", get(fetch_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
