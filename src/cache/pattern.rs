//! Key Pattern Module
//!
//! Pattern deletion accepts either a glob (`*` matches any run of characters,
//! anchored at both ends) or, when no `*` is present, a plain key prefix.

use regex::Regex;

use crate::error::{CacheError, Result};

/// Compiled key pattern.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    Prefix(String),
    Glob(Regex),
}

impl KeyPattern {
    /// Parses a glob-or-prefix pattern. Empty patterns are rejected so a
    /// stray call cannot wipe every key.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidRequest(
                "Pattern cannot be empty".to_string(),
            ));
        }

        if !pattern.contains('*') {
            return Ok(KeyPattern::Prefix(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| CacheError::InvalidRequest(format!("Bad pattern '{}': {}", pattern, e)))?;
        Ok(KeyPattern::Glob(regex))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Glob(regex) => regex.is_match(key),
        }
    }
}
