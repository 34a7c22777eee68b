//! API Module
//!
//! HTTP handlers and routing for the cache sidecar.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats` - Cache statistics and warm-up state
//! - `PUT /cache/entries` - Store a JSON value
//! - `GET /cache/entries/:key` - Look up a value
//! - `DELETE /cache/entries/:key` - Delete a key
//! - `DELETE /cache/entries?pattern=` - Delete keys matching a glob or prefix
//! - `POST /cache/clear` - Empty both tiers
//! - `POST /cache/invalidate` - Apply a named invalidation intent
//! - `POST /events` - Apply a domain event
//! - `POST /cache/warm` - Run the essential prefetches
//! - `POST /worker/command` - Network worker command channel
//! - `GET /fetch/*path` - Fetch through the network worker

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
