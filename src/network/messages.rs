//! Worker messages
//!
//! Intercepted requests and responses, and the JSON command channel.

use std::collections::BTreeMap;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::network::{ResourceClass, FALLBACK_HEADER, SOURCE_HEADER};

/// Connection-level headers that describe one upstream hop and must not be
/// replayed on a rebuilt response.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether `name` belongs to a single connection rather than the resource.
pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// An outbound request as the worker sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl InterceptedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Identity of this request inside a bucket.
    pub fn cache_id(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// API fallback within the staleness window
    StaleCache,
    /// Placeholder for a static asset or image that could not be fetched
    Offline,
    /// API failure with nothing usable cached
    Unavailable,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::StaleCache => "stale_cache",
            ResponseSource::Offline => "offline",
            ResponseSource::Unavailable => "unavailable",
        }
    }
}

/// A response produced by the worker, from the network or a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: u16,
    /// Lowercased header names
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub source: ResponseSource,
    /// Set on API responses when they are stored
    pub cached_at: Option<u64>,
}

impl InterceptedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
            cached_at: None,
        }
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Stand-in for a static asset or image that is neither cached nor
    /// reachable.
    pub fn offline() -> Self {
        Self::new(503, "Offline")
            .with_header("content-type", "text/plain")
            .with_source(ResponseSource::Offline)
    }

    /// Structured failure for an API request with no usable cached copy.
    pub fn unavailable() -> Self {
        Self::json(504, &json!({ "error": "network_unavailable", "cached": false }))
            .with_source(ResponseSource::Unavailable)
    }

    /// Copy served from the API fallback.
    pub fn stale(mut self) -> Self {
        self.source = ResponseSource::StaleCache;
        self.with_header(FALLBACK_HEADER, "stale")
    }
}

impl IntoResponse for InterceptedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = (status, self.body).into_response();

        let headers = response.headers_mut();
        for (name, value) in self.headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers.insert(SOURCE_HEADER, HeaderValue::from_static(self.source.as_str()));
        response
    }
}

// == Command Channel ==
/// Which buckets a `CLEAR_CACHE` command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTarget {
    All,
    Static,
    Api,
    Images,
}

impl CacheTarget {
    /// Classes whose buckets the target covers.
    pub fn classes(self) -> Vec<ResourceClass> {
        match self {
            CacheTarget::All => ResourceClass::CACHED.to_vec(),
            CacheTarget::Static => vec![ResourceClass::StaticAsset],
            CacheTarget::Api => vec![ResourceClass::ApiResource],
            CacheTarget::Images => vec![ResourceClass::Image],
        }
    }
}

/// A command sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    #[serde(rename = "CLEAR_CACHE")]
    ClearCache {
        #[serde(rename = "cacheType")]
        cache_type: CacheTarget,
    },
    #[serde(rename = "GET_CACHE_STATS")]
    GetCacheStats,
}

/// The worker's answer to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    Ack { success: bool },
    Stats { stats: BTreeMap<String, usize> },
}
