//! Configuration module for Wayfinder
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Any error here is fatal: a crawl never starts on an invalid configuration.
//!
//! # Example
//!
//! ```no_run
//! use wayfinder::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("wayfinder.toml")).unwrap();
//! println!("Crawl will stop after {} pages", config.crawl.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AnnotationEntry, AnnotationRole, Config, CrawlConfig, OutputConfig, ScopeConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
