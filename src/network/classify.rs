//! Request classification
//!
//! Maps a method and URL to the resource class that decides its caching
//! strategy. The inputs are plain lists from [`NetworkConfig`].

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::error::{CacheError, Result};
use crate::network::NetworkConfig;

/// Caching class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    StaticAsset,
    ApiResource,
    Image,
    Uncached,
}

impl ResourceClass {
    /// Every class that owns a bucket.
    pub const CACHED: [ResourceClass; 3] = [
        ResourceClass::StaticAsset,
        ResourceClass::ApiResource,
        ResourceClass::Image,
    ];

    /// Bucket name prefix, `None` for uncached requests.
    pub fn bucket_class(self) -> Option<&'static str> {
        match self {
            ResourceClass::StaticAsset => Some("static"),
            ResourceClass::ApiResource => Some("api"),
            ResourceClass::Image => Some("images"),
            ResourceClass::Uncached => None,
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceClass::StaticAsset => write!(f, "static-asset"),
            ResourceClass::ApiResource => write!(f, "api-resource"),
            ResourceClass::Image => write!(f, "image"),
            ResourceClass::Uncached => write!(f, "uncached"),
        }
    }
}

// == Request Classifier ==
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    static_suffixes: Vec<String>,
    static_prefixes: Vec<String>,
    api_patterns: Vec<Regex>,
    image_extensions: Vec<String>,
    image_path_patterns: Vec<String>,
}

impl RequestClassifier {
    /// Compiles the classification lists. Fails on an invalid API pattern.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let api_patterns = config
            .api_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    CacheError::InvalidRequest(format!("Invalid API pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            static_suffixes: lowercased(&config.static_suffixes),
            static_prefixes: config.static_prefixes.clone(),
            api_patterns,
            image_extensions: lowercased(&config.image_extensions),
            image_path_patterns: config.image_path_patterns.clone(),
        })
    }

    /// Classifies a request. Only `GET` is ever cached; the checks run in the
    /// order image, static asset, API.
    pub fn classify(&self, method: &str, url: &str) -> ResourceClass {
        if !method.eq_ignore_ascii_case("GET") {
            return ResourceClass::Uncached;
        }

        let path = url_path(url);
        let lowered = path.to_lowercase();

        let is_image = self.image_extensions.iter().any(|ext| lowered.ends_with(ext))
            || self.image_path_patterns.iter().any(|p| path.contains(p.as_str()));
        if is_image {
            return ResourceClass::Image;
        }

        let is_static = self.static_suffixes.iter().any(|s| lowered.ends_with(s))
            || self.static_prefixes.iter().any(|p| path.starts_with(p.as_str()));
        if is_static {
            return ResourceClass::StaticAsset;
        }

        if self.api_patterns.iter().any(|re| re.is_match(path)) {
            return ResourceClass::ApiResource;
        }

        ResourceClass::Uncached
    }
}

fn lowercased(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// Path part of a URL: scheme and authority dropped, query and fragment cut.
fn url_path(url: &str) -> &str {
    let without_origin = match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "/",
            }
        }
        None => url,
    };

    let end = without_origin
        .find(|c: char| c == '?' || c == '#')
        .unwrap_or(without_origin.len());
    &without_origin[..end]
}
