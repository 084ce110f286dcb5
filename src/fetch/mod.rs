//! Fetch client
//!
//! This module handles single HTTP fetches for the crawler, including:
//! - The `Fetcher` seam the scheduler talks to
//! - Error classification into transient and terminal kinds
//! - A reqwest-backed implementation with manual redirect following
//!
//! Politeness (per-host limits, retries, backoff) is the scheduler's job; a
//! fetcher performs exactly one logical request per call.

mod http;

pub use http::{build_http_client, HttpFetcher};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A completed fetch whose final response was 2xx
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL that was asked for
    pub requested_url: Url,
    /// URL that answered after redirects
    pub final_url: Url,
    /// HTTP status code of the final response
    pub status: u16,
    /// Response headers (names lowercased)
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: String,
    /// Wall time of the whole redirect chain
    pub elapsed_ms: u64,
    /// Every hop after the requested URL, ending with `final_url`
    pub redirects: Vec<Url>,
}

impl FetchResponse {
    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Value of the `Content-Type` header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns true if the body should be parsed as HTML
    ///
    /// A missing `Content-Type` falls back to sniffing the body for markup.
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(content_type) => {
                let mime = content_type
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_ascii_lowercase();
                mime == "text/html" || mime == "application/xhtml+xml"
            }
            None => self.body.trim_start().starts_with('<'),
        }
    }

    /// Returns true if the request was redirected
    pub fn was_redirected(&self) -> bool {
        !self.redirects.is_empty()
    }
}

/// Why a fetch did not produce a usable response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("HTTP {0}")]
    Http4xx(u16),

    #[error("HTTP {0}")]
    Http5xx(u16),

    #[error("redirect loop at {0}")]
    RedirectLoop(String),

    #[error("redirect chain longer than {0} hops")]
    TooManyRedirects(usize),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Maps a non-2xx status to its error kind
    ///
    /// # Returns
    ///
    /// * `None` - For 2xx statuses
    /// * `Some(FetchError)` - For everything else
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            400..=499 => Some(FetchError::Http4xx(status)),
            500..=599 => Some(FetchError::Http5xx(status)),
            _ => Some(FetchError::Other(format!("unexpected HTTP status {}", status))),
        }
    }

    /// Returns true if another attempt may succeed
    ///
    /// | Kind | Retried |
    /// |------|---------|
    /// | Timeout, connection refused, body read | yes |
    /// | HTTP 5xx, 408, 429 | yes |
    /// | Other network errors | yes |
    /// | DNS, TLS, other 4xx, redirect errors | no |
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::Refused(_)
            | FetchError::Http5xx(_)
            | FetchError::Body(_)
            | FetchError::Other(_) => true,
            FetchError::Http4xx(status) => *status == 408 || *status == 429,
            FetchError::Dns(_)
            | FetchError::Tls(_)
            | FetchError::RedirectLoop(_)
            | FetchError::TooManyRedirects(_) => false,
        }
    }

    /// Short stable name used in failure histograms
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Dns(_) => "dns",
            FetchError::Refused(_) => "refused",
            FetchError::Tls(_) => "tls",
            FetchError::Http4xx(_) => "http4xx",
            FetchError::Http5xx(_) => "http5xx",
            FetchError::RedirectLoop(_) => "redirect_loop",
            FetchError::TooManyRedirects(_) => "too_many_redirects",
            FetchError::Body(_) => "body",
            FetchError::Other(_) => "other",
        }
    }
}

/// Performs one HTTP fetch
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, following redirects, within `timeout` per request
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError>;
}
