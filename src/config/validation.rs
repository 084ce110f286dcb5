use crate::config::types::{AnnotationEntry, Config, CrawlConfig, ScopeConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_scope_config(&config.scope)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_annotations(&config.annotations)?;
    Ok(())
}

/// Validates crawl bounds and entry URLs
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.entry_urls.is_empty() {
        return Err(ConfigError::Validation(
            "entry_urls must contain at least one URL".to_string(),
        ));
    }

    for raw in &config.entry_urls {
        validate_http_url(raw, "entry URL")?;
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_flow_length < 1 {
        return Err(ConfigError::Validation(format!(
            "max_flow_length must be >= 1, got {}",
            config.max_flow_length
        )));
    }

    if config.max_flows < 1 {
        return Err(ConfigError::Validation(format!(
            "max_flows must be >= 1, got {}",
            config.max_flows
        )));
    }

    if config.worker_count < 1 || config.worker_count > 64 {
        return Err(ConfigError::Validation(format!(
            "worker_count must be between 1 and 64, got {}",
            config.worker_count
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.per_host_concurrency < 1 || config.per_host_concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "per_host_concurrency must be between 1 and 32, got {}",
            config.per_host_concurrency
        )));
    }

    if !config.global_rate_limit_per_sec.is_finite() || config.global_rate_limit_per_sec <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "global_rate_limit_per_sec must be a positive number, got {}",
            config.global_rate_limit_per_sec
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_redirects < 1 {
        return Err(ConfigError::Validation(
            "max_redirects must be >= 1".to_string(),
        ));
    }

    if config.wall_clock_budget_secs == Some(0) {
        return Err(ConfigError::Validation(
            "wall_clock_budget_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates allow/deny patterns and extension filters
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for pattern in config.allow_paths.iter().chain(config.deny_paths.iter()) {
        validate_path_pattern(pattern)?;
    }

    for ext in &config.skip_extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "skip extension '{}' must look like '.ext'",
                ext
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // The name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only letters, digits, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates page annotations
fn validate_annotations(annotations: &[AnnotationEntry]) -> Result<(), ConfigError> {
    for annotation in annotations {
        validate_http_url(&annotation.url, "annotation URL")?;

        if let Some(label) = &annotation.label {
            if label.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "annotation label for '{}' cannot be blank",
                    annotation.url
                )));
            }
        }
    }
    Ok(())
}

fn validate_http_url(raw: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, raw
        )));
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            what, raw
        )));
    }

    Ok(())
}

/// Validates a robots-style path pattern
fn validate_path_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Path pattern cannot be empty".to_string(),
        ));
    }

    if !pattern.starts_with('/') && !pattern.starts_with('*') {
        return Err(ConfigError::InvalidPattern(format!(
            "Path pattern '{}' must start with '/' or '*'",
            pattern
        )));
    }

    if pattern.chars().any(|c| c.is_whitespace()) {
        return Err(ConfigError::InvalidPattern(format!(
            "Path pattern '{}' cannot contain whitespace",
            pattern
        )));
    }

    // `$` anchors the end and is only meaningful as the final character
    if let Some(pos) = pattern.find('$') {
        if pos != pattern.len() - 1 {
            return Err(ConfigError::InvalidPattern(format!(
                "Path pattern '{}' may only use '$' at the end",
                pattern
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
