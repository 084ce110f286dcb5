use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Wayfinder
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "annotation")]
    pub annotations: Vec<AnnotationEntry>,
}

/// Crawl bounds, politeness and flow enumeration settings
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// URLs the crawl starts from; each is a flow entry point
    #[serde(rename = "entry-urls")]
    pub entry_urls: Vec<String>,

    /// Maximum discovery depth (entry URLs are depth 0)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Maximum number of pages claimed for fetching
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Maximum number of edges in an enumerated flow
    #[serde(rename = "max-flow-length")]
    pub max_flow_length: u32,

    /// Upper bound on the number of enumerated flows
    #[serde(rename = "max-flows", default = "default_max_flows")]
    pub max_flows: u32,

    /// Size of the worker pool
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: u32,

    /// Entries claimed from the frontier per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Maximum in-flight fetches against one host
    #[serde(rename = "per-host-concurrency")]
    pub per_host_concurrency: u32,

    /// Maximum requests per second across all hosts
    #[serde(rename = "global-rate-limit-per-sec")]
    pub global_rate_limit_per_sec: f64,

    /// Retries after the first failed attempt
    #[serde(rename = "retry-budget")]
    pub retry_budget: u32,

    /// Base delay of the exponential retry backoff (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Timeout of a single request (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum length of a redirect chain
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-host-interval-ms", default)]
    pub min_host_interval_ms: u64,

    /// Optional wall-clock budget for the whole crawl (seconds)
    #[serde(rename = "wall-clock-budget-secs", default)]
    pub wall_clock_budget_secs: Option<u64>,

    /// Restrict the crawl to the hosts of the entry URLs
    #[serde(rename = "same-host-only", default = "default_true")]
    pub same_host_only: bool,

    /// Fetch and honour each host's robots.txt
    #[serde(rename = "respect-robots-txt", default = "default_true")]
    pub respect_robots_txt: bool,
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn min_host_interval(&self) -> Duration {
        Duration::from_millis(self.min_host_interval_ms)
    }

    pub fn wall_clock_budget(&self) -> Option<Duration> {
        self.wall_clock_budget_secs.map(Duration::from_secs)
    }
}

/// Allow/deny path matcher and link filters
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    /// Robots-style path patterns that may be crawled
    #[serde(rename = "allow-paths", default)]
    pub allow_paths: Vec<String>,

    /// Robots-style path patterns that must not be crawled
    #[serde(rename = "deny-paths", default)]
    pub deny_paths: Vec<String>,

    /// File extensions never enqueued
    #[serde(rename = "skip-extensions", default = "default_skip_extensions")]
    pub skip_extensions: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            allow_paths: Vec::new(),
            deny_paths: Vec::new(),
            skip_extensions: default_skip_extensions(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Report destinations; every emitter is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON report
    #[serde(rename = "json-path", default)]
    pub json_path: Option<String>,

    /// Path of the Markdown report
    #[serde(rename = "markdown-path", default)]
    pub markdown_path: Option<String>,

    /// Path of the SQLite export
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}

/// Page annotation marking an extra flow entry or a goal page
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationEntry {
    pub url: String,
    pub role: AnnotationRole,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationRole {
    /// Flows also start from this page
    Entry,
    /// Flows end at this page even if it has outbound edges
    Goal,
}

fn default_max_flows() -> u32 {
    500
}

fn default_worker_count() -> u32 {
    4
}

fn default_batch_size() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_skip_extensions() -> Vec<String> {
    [
        ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".zip",
        ".mp4", ".mp3", ".woff", ".woff2",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}
