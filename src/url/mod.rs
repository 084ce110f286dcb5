//! URL handling module for Wayfinder
//!
//! This module provides URL Key canonicalization and host extraction. A URL Key
//! is the only identity a page has: the frontier, the flow graph and the reports
//! all key their records by it.

mod domain;
mod normalize;

use crate::UrlResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

// Re-export main functions
pub use domain::{extract_host, host_with_port, origin_of};
pub use normalize::{canonicalize, canonicalize_parsed, canonicalize_url, is_app_state_fragment};

/// Canonical string identifying a logical page across URL variants
///
/// Two raw URLs that canonicalize to the same key are the same page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlKey(String);

impl UrlKey {
    /// Canonicalizes `raw` into a key
    pub fn parse(raw: &str) -> UrlResult<Self> {
        canonicalize(raw)
    }

    pub(crate) fn from_canonical(url: &Url) -> Self {
        Self(url.as_str().to_string())
    }

    /// Builds a key for a synthetic node that has no real URL
    pub(crate) fn synthetic(name: &str) -> Self {
        Self(format!("wayfinder:{}", name))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key back into a [`Url`]
    pub fn to_url(&self) -> UrlResult<Url> {
        Url::parse(&self.0).map_err(|e| crate::UrlError::Parse(e.to_string()))
    }

    /// Returns the lowercase host of the key, if it has one
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0).ok().as_ref().and_then(extract_host)
    }

    /// Path, query and app-state fragment, used as a short label in reports
    pub fn display_path(&self) -> String {
        match Url::parse(&self.0) {
            Ok(url) if url.has_host() => {
                let mut label = url.path().to_string();
                if let Some(query) = url.query() {
                    label.push('?');
                    label.push_str(query);
                }
                if let Some(fragment) = url.fragment() {
                    label.push('#');
                    label.push_str(fragment);
                }
                label
            }
            _ => self.0.clone(),
        }
    }
}

impl fmt::Display for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UrlKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trips_through_url() {
        let key = UrlKey::parse("https://Example.com/a/?x=1").unwrap();
        let url = key.to_url().unwrap();
        assert_eq!(UrlKey::from_canonical(&url), key);
    }

    #[test]
    fn test_display_path() {
        let key = UrlKey::parse("https://example.com/contact?lang=en").unwrap();
        assert_eq!(key.display_path(), "/contact?lang=en");

        let root = UrlKey::parse("https://example.com").unwrap();
        assert_eq!(root.display_path(), "/");

        let sink = UrlKey::synthetic("external");
        assert_eq!(sink.display_path(), "wayfinder:external");
    }

    #[test]
    fn test_host() {
        let key = UrlKey::parse("https://Shop.Example.com/x").unwrap();
        assert_eq!(key.host(), Some("shop.example.com".to_string()));
        assert_eq!(UrlKey::synthetic("failed").host(), None);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let key = UrlKey::parse("https://example.com/a").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"https://example.com/a\"");
    }
}
