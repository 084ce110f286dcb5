//! Wayfinder: crawl a site, rebuild its user flows, derive test requirements
//!
//! This crate implements a polite, concurrent crawler that records every page,
//! link and form it sees into a flow graph, then walks that graph to produce
//! navigable user flows and the test requirements that cover them.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod frontier;
pub mod graph;
pub mod page;
pub mod policy;
pub mod report;
pub mod synth;
pub mod url;

use thiserror::Error;

/// Main error type for Wayfinder operations
#[derive(Debug, Error)]
pub enum WayfinderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] frontier::FrontierError),

    #[error("Graph invariant violated: {0}")]
    Graph(#[from] graph::GraphError),

    #[error("Output error: {0}")]
    Output(#[from] report::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid path pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Wayfinder operations
pub type Result<T> = std::result::Result<T, WayfinderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, CrawlRun, RunStatus, StopReason};
pub use report::CrawlReport;
pub use url::{canonicalize, UrlKey};
