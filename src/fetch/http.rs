//! reqwest-backed fetcher
//!
//! Redirects are followed by hand so every hop is visible: the chain is
//! capped, loops are detected, and the final URL is reported back so the
//! crawler can key the page by where it actually landed.

use crate::config::{CrawlConfig, UserAgentConfig};
use crate::fetch::{FetchError, FetchResponse, Fetcher};
use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect::Policy, Client};
use std::collections::HashSet;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::trace;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher that talks to real servers
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    /// Creates a fetcher from an existing client
    pub fn new(client: Client, max_redirects: usize) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    /// Creates a fetcher configured for a crawl
    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawl: &CrawlConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent)?;
        Ok(Self::new(client, crawl.max_redirects as usize))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let mut current = url.clone();
        let mut redirects: Vec<Url> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(without_fragment(&current));

        loop {
            let response = self
                .client
                .get(current.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(classify_reqwest_error)?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);

                if let Some(location) = location {
                    let next = current.join(&location).map_err(|e| {
                        FetchError::Other(format!("invalid redirect target '{}': {}", location, e))
                    })?;

                    if next.scheme() != "http" && next.scheme() != "https" {
                        return Err(FetchError::Other(format!(
                            "redirect to unsupported scheme: {}",
                            next
                        )));
                    }

                    if redirects.len() >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.max_redirects));
                    }

                    if !seen.insert(without_fragment(&next)) {
                        return Err(FetchError::RedirectLoop(next.to_string()));
                    }

                    trace!("{} redirected ({}) to {}", current, status.as_u16(), next);
                    redirects.push(next.clone());
                    current = next;
                    continue;
                }
            }

            if let Some(error) = FetchError::from_status(status.as_u16()) {
                return Err(error);
            }

            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Body(e.to_string()))?;

            return Ok(FetchResponse {
                requested_url: url.clone(),
                final_url: current,
                status: status.as_u16(),
                headers,
                body,
                elapsed_ms: started.elapsed().as_millis() as u64,
                redirects,
            });
        }
    }
}

fn without_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Maps a reqwest error onto the fetch error taxonomy
///
/// reqwest only exposes coarse predicates, so DNS and TLS failures are
/// recognised from the messages in the error's source chain.
fn classify_reqwest_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout;
    }

    let chain = error_chain(&error).to_lowercase();

    if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
    {
        return FetchError::Dns(chain);
    }

    if chain.contains("certificate")
        || chain.contains("tls")
        || chain.contains("ssl")
        || chain.contains("handshake")
    {
        return FetchError::Tls(chain);
    }

    if error.is_connect() {
        return FetchError::Refused(chain);
    }

    if error.is_body() || error.is_decode() {
        return FetchError::Body(chain);
    }

    FetchError::Other(chain)
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        let config = create_test_config();
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        let config = create_test_config();
        assert_eq!(
            config.header_value(),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_without_fragment() {
        let url = Url::parse("https://example.com/a#b").unwrap();
        assert_eq!(without_fragment(&url), "https://example.com/a");
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        let fetcher = HttpFetcher::new(build_http_client(&create_test_config()).unwrap(), 5);
        // Port 9 (discard) is closed on test machines
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let error = fetcher
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::Refused(_) | FetchError::Timeout));
    }
}
