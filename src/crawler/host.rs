//! Per-host politeness
//!
//! Each host gets its own semaphore capping in-flight fetches and a request
//! slot clock enforcing a minimum interval between requests. A robots.txt
//! `Crawl-delay` can only raise that interval.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Politeness state of one host
#[derive(Debug)]
struct HostState {
    permits: Arc<Semaphore>,
    /// Earliest start time of the next request
    next_slot: Option<Instant>,
    min_interval: Duration,
    request_count: u64,
}

/// Held for the duration of one fetch; releases the host slot on drop
#[derive(Debug)]
pub struct HostPermit {
    _permit: OwnedSemaphorePermit,
}

/// Per-host concurrency and spacing for one run
#[derive(Debug)]
pub struct HostLimiter {
    hosts: Mutex<HashMap<String, HostState>>,
    per_host: usize,
    default_interval: Duration,
}

impl HostLimiter {
    /// Creates a limiter
    ///
    /// # Arguments
    ///
    /// * `per_host` - Maximum in-flight fetches per host
    /// * `default_interval` - Minimum time between request starts on one host
    pub fn new(per_host: usize, default_interval: Duration) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            per_host: per_host.max(1),
            default_interval,
        }
    }

    /// Waits for a free slot on `host` and its request spacing
    ///
    /// The host lock is only held to reserve a start time; the wait happens
    /// outside it. Returns `None` only if the host semaphore was closed.
    pub async fn acquire(&self, host: &str) -> Option<HostPermit> {
        let semaphore = {
            let mut hosts = self.hosts.lock();
            let state = self.state_mut(&mut hosts, host);
            state.permits.clone()
        };

        let permit = semaphore.acquire_owned().await.ok()?;

        let wait = {
            let mut hosts = self.hosts.lock();
            let state = self.state_mut(&mut hosts, host);
            let now = Instant::now();
            let start = match state.next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            state.next_slot = Some(start + state.min_interval);
            state.request_count += 1;
            start.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before next request to {}", wait, host);
            tokio::time::sleep(wait).await;
        }

        Some(HostPermit { _permit: permit })
    }

    /// Raises the minimum interval of `host` (never lowers it)
    pub fn raise_min_interval(&self, host: &str, interval: Duration) {
        let mut hosts = self.hosts.lock();
        let state = self.state_mut(&mut hosts, host);
        if interval > state.min_interval {
            tracing::debug!("Crawl-delay for {} raised to {:?}", host, interval);
            state.min_interval = interval;
        }
    }

    pub fn min_interval(&self, host: &str) -> Duration {
        self.hosts
            .lock()
            .get(host)
            .map(|state| state.min_interval)
            .unwrap_or(self.default_interval)
    }

    /// Requests started against `host` so far
    pub fn request_count(&self, host: &str) -> u64 {
        self.hosts
            .lock()
            .get(host)
            .map(|state| state.request_count)
            .unwrap_or(0)
    }

    /// Fetches currently holding a slot on `host`
    pub fn in_flight(&self, host: &str) -> usize {
        self.hosts
            .lock()
            .get(host)
            .map(|state| self.per_host - state.permits.available_permits())
            .unwrap_or(0)
    }

    fn state_mut<'a>(&self, hosts: &'a mut HashMap<String, HostState>, host: &str) -> &'a mut HostState {
        hosts.entry(host.to_string()).or_insert_with(|| HostState {
            permits: Arc::new(Semaphore::new(self.per_host)),
            next_slot: None,
            min_interval: self.default_interval,
            request_count: 0,
        })
    }
}
