//! Request and Response models for the cache sidecar API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{IntentName, InvalidateRequest, PatternQuery, SetEntryRequest};
pub use responses::{
    ClearResponse, DeleteResponse, EntryResponse, ErrorResponse, HealthResponse, RemovedResponse,
    SetEntryResponse, StatsResponse,
};
