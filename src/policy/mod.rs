//! Crawl-permission policy
//!
//! This module decides whether a discovered link may be enqueued:
//! - Same-host scope against the entry URLs
//! - Static asset extensions that are never worth fetching
//! - The configured allow/deny path matcher
//! - The host's own robots.txt (optional)

mod robots;
mod rules;

pub use robots::RobotsCache;
pub use rules::RobotsRules;

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::url::host_with_port;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Why a discovered link was not enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Host is outside the crawl scope
    OutOfScope,
    /// Path matched the configured deny list (or missed the allow list)
    DeniedByConfig,
    /// Path is disallowed by the host's robots.txt
    DeniedByRobots,
    /// Link points at a static asset
    StaticAsset,
    /// Link lies deeper than the configured maximum depth
    DepthExceeded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OutOfScope => "out_of_scope",
            SkipReason::DeniedByConfig => "denied_by_config",
            SkipReason::DeniedByRobots => "denied_by_robots",
            SkipReason::StaticAsset => "static_asset",
            SkipReason::DepthExceeded => "depth_exceeded",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkVerdict {
    Allowed,
    Skipped(SkipReason),
}

impl LinkVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LinkVerdict::Allowed)
    }
}

/// Everything the crawler consults before enqueueing a link
#[derive(Debug)]
pub struct CrawlPolicy {
    path_rules: RobotsRules,
    agent_token: String,
    scope_hosts: HashSet<String>,
    same_host_only: bool,
    skip_extensions: Vec<String>,
    respect_robots: bool,
    robots_timeout: Duration,
    robots: RobotsCache,
}

impl CrawlPolicy {
    /// Builds the policy for a run
    ///
    /// Entry URLs that fail to parse are ignored here; configuration
    /// validation has already rejected them.
    pub fn from_config(config: &Config) -> Self {
        let scope_hosts = config
            .crawl
            .entry_urls
            .iter()
            .filter_map(|raw| Url::parse(raw).ok())
            .filter_map(|url| host_with_port(&url))
            .collect();

        Self {
            path_rules: RobotsRules::from_path_patterns(
                &config.scope.allow_paths,
                &config.scope.deny_paths,
            ),
            agent_token: config.user_agent.crawler_name.clone(),
            scope_hosts,
            same_host_only: config.crawl.same_host_only,
            skip_extensions: config
                .scope
                .skip_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
            respect_robots: config.crawl.respect_robots_txt,
            robots_timeout: config.crawl.request_timeout(),
            robots: RobotsCache::new(),
        }
    }

    /// Applies every check that needs no network access
    pub fn check_static(&self, url: &Url) -> LinkVerdict {
        if self.same_host_only {
            let in_scope = host_with_port(url)
                .map(|host| self.scope_hosts.contains(&host))
                .unwrap_or(false);
            if !in_scope {
                return LinkVerdict::Skipped(SkipReason::OutOfScope);
            }
        }

        let path = url.path().to_ascii_lowercase();
        if self.skip_extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
            return LinkVerdict::Skipped(SkipReason::StaticAsset);
        }

        if !self.path_rules.is_allowed(url.as_str(), &self.agent_token) {
            return LinkVerdict::Skipped(SkipReason::DeniedByConfig);
        }

        LinkVerdict::Allowed
    }

    /// Applies the static checks, then the host's robots.txt
    pub async fn check(&self, url: &Url, fetcher: &dyn Fetcher) -> LinkVerdict {
        let verdict = self.check_static(url);
        if !verdict.is_allowed() || !self.respect_robots {
            return verdict;
        }

        let rules = self.robots.rules_for(url, fetcher, self.robots_timeout).await;
        if rules.is_allowed(url.as_str(), &self.agent_token) {
            LinkVerdict::Allowed
        } else {
            LinkVerdict::Skipped(SkipReason::DeniedByRobots)
        }
    }

    /// Crawl-delay that robots.txt asks of this crawler for the host of `url`
    pub async fn crawl_delay(&self, url: &Url, fetcher: &dyn Fetcher) -> Option<Duration> {
        if !self.respect_robots {
            return None;
        }
        self.robots
            .rules_for(url, fetcher, self.robots_timeout)
            .await
            .crawl_delay(&self.agent_token)
    }

    pub fn respects_robots(&self) -> bool {
        self.respect_robots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::fetch::{FetchError, FetchResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_config(extra_scope: &str, robots: bool) -> Config {
        parse_config(&format!(
            r#"
[crawl]
entry-urls = ["https://shop.example.com/"]
max-depth = 3
max-pages = 10
max-flow-length = 5
per-host-concurrency = 1
global-rate-limit-per-sec = 10.0
retry-budget = 0
respect-robots-txt = {}

[scope]
{}

[user-agent]
crawler-name = "Wayfinder"
crawler-version = "0.1"
contact-url = "https://example.com/bot"
contact-email = "qa@example.com"
"#,
            robots, extra_scope
        ))
        .unwrap()
    }

    /// Serves one robots.txt body and counts requests
    struct RobotsOnly {
        body: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for RobotsOnly {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.body {
                Some(body) if url.path() == "/robots.txt" => Ok(FetchResponse {
                    requested_url: url.clone(),
                    final_url: url.clone(),
                    status: 200,
                    headers: vec![("content-type".into(), "text/plain".into())],
                    body: body.to_string(),
                    elapsed_ms: 1,
                    redirects: Vec::new(),
                }),
                _ => Err(FetchError::Http4xx(404)),
            }
        }
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_out_of_scope_host() {
        let policy = CrawlPolicy::from_config(&create_test_config("", false));
        assert_eq!(
            policy.check_static(&url("https://other.example.org/")),
            LinkVerdict::Skipped(SkipReason::OutOfScope)
        );
        assert!(policy.check_static(&url("https://shop.example.com/cart")).is_allowed());
    }

    #[test]
    fn test_static_assets_skipped() {
        let policy = CrawlPolicy::from_config(&create_test_config("", false));
        assert_eq!(
            policy.check_static(&url("https://shop.example.com/brochure.PDF")),
            LinkVerdict::Skipped(SkipReason::StaticAsset)
        );
        assert_eq!(
            policy.check_static(&url("https://shop.example.com/static/app.js")),
            LinkVerdict::Skipped(SkipReason::StaticAsset)
        );
    }

    #[test]
    fn test_deny_paths() {
        let policy = CrawlPolicy::from_config(&create_test_config(
            r#"deny-paths = ["/logout", "/admin"]"#,
            false,
        ));
        assert_eq!(
            policy.check_static(&url("https://shop.example.com/admin/users")),
            LinkVerdict::Skipped(SkipReason::DeniedByConfig)
        );
        assert!(policy.check_static(&url("https://shop.example.com/login")).is_allowed());
    }

    #[tokio::test]
    async fn test_robots_disallow_and_single_fetch() {
        let policy = CrawlPolicy::from_config(&create_test_config("", true));
        let fetcher = RobotsOnly {
            body: Some("User-agent: *\nDisallow: /private\nCrawl-delay: 2"),
            calls: AtomicUsize::new(0),
        };

        assert_eq!(
            policy.check(&url("https://shop.example.com/private/x"), &fetcher).await,
            LinkVerdict::Skipped(SkipReason::DeniedByRobots)
        );
        assert!(policy
            .check(&url("https://shop.example.com/public"), &fetcher)
            .await
            .is_allowed());
        assert_eq!(
            policy.crawl_delay(&url("https://shop.example.com/"), &fetcher).await,
            Some(Duration::from_secs(2))
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let policy = CrawlPolicy::from_config(&create_test_config("", true));
        let fetcher = RobotsOnly {
            body: None,
            calls: AtomicUsize::new(0),
        };
        assert!(policy
            .check(&url("https://shop.example.com/anything"), &fetcher)
            .await
            .is_allowed());
        assert_eq!(
            policy.crawl_delay(&url("https://shop.example.com/"), &fetcher).await,
            None
        );
    }

    #[tokio::test]
    async fn test_robots_ignored_when_disabled() {
        let policy = CrawlPolicy::from_config(&create_test_config("", false));
        let fetcher = RobotsOnly {
            body: Some("User-agent: *\nDisallow: /"),
            calls: AtomicUsize::new(0),
        };
        assert!(policy
            .check(&url("https://shop.example.com/x"), &fetcher)
            .await
            .is_allowed());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
