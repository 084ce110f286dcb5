use crate::fetch::{FetchError, Fetcher};
use crate::policy::rules::RobotsRules;
use crate::url::{host_with_port, origin_of};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

/// robots.txt rules per host, fetched at most once per run
///
/// Concurrent workers asking for the same host share one fetch.
#[derive(Debug, Default)]
pub struct RobotsCache {
    hosts: Mutex<HashMap<String, Arc<OnceCell<Arc<RobotsRules>>>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rules for the host of `url`, fetching them on first use
    pub async fn rules_for(
        &self,
        url: &Url,
        fetcher: &dyn Fetcher,
        timeout: Duration,
    ) -> Arc<RobotsRules> {
        let Some(host) = host_with_port(url) else {
            return Arc::new(RobotsRules::allow_all());
        };

        let cell = {
            let mut hosts = self.hosts.lock();
            hosts.entry(host).or_default().clone()
        };

        let rules = cell
            .get_or_init(|| async { Arc::new(fetch_robots(url, fetcher, timeout).await) })
            .await
            .clone();
        rules
    }

    /// Number of hosts with a cached entry
    pub fn len(&self) -> usize {
        self.hosts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetches robots.txt for the origin of `url`
///
/// A missing file (4xx) allows everything. Any other failure also allows
/// everything, with a warning, so an unreachable robots.txt never blocks a
/// crawl that the page fetches themselves may still complete.
async fn fetch_robots(url: &Url, fetcher: &dyn Fetcher, timeout: Duration) -> RobotsRules {
    let Some(origin) = origin_of(url) else {
        return RobotsRules::allow_all();
    };

    let robots_url = match Url::parse(&format!("{}/robots.txt", origin)) {
        Ok(robots_url) => robots_url,
        Err(_) => return RobotsRules::allow_all(),
    };

    match fetcher.fetch(&robots_url, timeout).await {
        Ok(response) => {
            debug!("Loaded robots.txt from {} ({} bytes)", robots_url, response.body.len());
            RobotsRules::from_content(&response.body)
        }
        Err(FetchError::Http4xx(status)) => {
            debug!("No robots.txt at {} (HTTP {})", robots_url, status);
            RobotsRules::allow_all()
        }
        Err(e) => {
            warn!("Failed to fetch {}: {}; allowing all", robots_url, e);
            RobotsRules::allow_all()
        }
    }
}
