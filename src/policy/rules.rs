//! Robots-style rule groups
//!
//! The same matcher serves two masters: a host's own robots.txt and the
//! configured allow/deny path lists, which are rendered into a synthetic
//! robots.txt body so both follow longest-match-wins semantics.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Product token used for the synthetic rule group built from configuration
const CONFIG_AGENT: &str = "*";

/// A parsed robots.txt body
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw rule text (empty string means allow all)
    content: String,
    allow_all: bool,
}

impl RobotsRules {
    /// Wraps the raw content of a robots.txt file
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates permissive rules
    ///
    /// Used when robots.txt is missing or could not be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Renders configured allow/deny path patterns as a single rule group
    ///
    /// A non-empty allow list turns the matcher into an allow list: everything
    /// not matched by an allow pattern is denied (`Disallow: /`). The longest
    /// matching pattern decides, so `deny-paths = ["/shop/admin"]` still wins
    /// over `allow-paths = ["/shop"]`.
    ///
    /// # Arguments
    ///
    /// * `allow` - Patterns that may be crawled
    /// * `deny` - Patterns that must not be crawled
    ///
    /// # Returns
    ///
    /// Rules that allow everything when both lists are empty
    pub fn from_path_patterns(allow: &[String], deny: &[String]) -> Self {
        if allow.is_empty() && deny.is_empty() {
            return Self::allow_all();
        }

        let mut body = format!("User-agent: {}\n", CONFIG_AGENT);
        for pattern in allow {
            body.push_str(&format!("Allow: {}\n", pattern));
        }
        for pattern in deny {
            body.push_str(&format!("Disallow: {}\n", pattern));
        }
        if !allow.is_empty() {
            body.push_str("Disallow: /\n");
        }

        Self::from_content(&body)
    }

    /// Returns the raw rule text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL (or path) to check
    /// * `user_agent` - The product token, e.g. `Wayfinder`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay that applies to a user agent
    ///
    /// A delay in a group naming the agent beats one in the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut for_agent: Option<f64> = None;
        let mut for_wildcard: Option<f64> = None;

        for line in self.content.lines() {
            // Strip comments
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // Consecutive user-agent lines share one group
                if !in_agent_lines {
                    group_agents.clear();
                }
                group_agents.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };
            if !delay.is_finite() || delay < 0.0 {
                continue;
            }

            if group_agents.iter().any(|ua| ua != "*" && !ua.is_empty() && agent.contains(ua.as_str())) {
                for_agent.get_or_insert(delay);
            } else if group_agents.iter().any(|ua| ua == "*") {
                for_wildcard.get_or_insert(delay);
            }
        }

        for_agent.or(for_wildcard).map(Duration::from_secs_f64)
    }
}
