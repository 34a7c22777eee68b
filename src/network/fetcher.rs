//! Network access for the worker.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;
use tracing::debug;

use crate::network::messages::is_hop_by_hop;
use crate::network::{InterceptedRequest, InterceptedResponse};

/// A request that never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

/// Performs a request against the network.
///
/// Any HTTP status counts as a response; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, FetchError>;
}

/// [`Fetcher`] backed by `reqwest`. Origin-relative URLs resolve against the
/// base URL when one is set.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpFetcher {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    fn resolve(&self, url: &str) -> Result<String, FetchError> {
        if url.contains("://") {
            return Ok(url.to_string());
        }
        match &self.base_url {
            Some(base) => Ok(format!("{}/{}", base, url.trim_start_matches('/'))),
            None => Err(FetchError::InvalidRequest(format!(
                "relative URL '{}' without a base",
                url
            ))),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let url = self.resolve(&request.url)?;
        debug!("Fetching {} {}", method, url);

        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        let mut intercepted = InterceptedResponse::new(status, body);
        intercepted.headers = headers;
        Ok(intercepted)
    }
}
