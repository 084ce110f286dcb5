//! Crawl scheduler
//!
//! This module handles:
//! - A fixed pool of workers claiming breadth-first batches from the frontier
//! - Global and per-host politeness around every fetch
//! - Retrying transient fetch failures with exponential backoff
//! - Feeding normalized pages into the flow graph and new links into the frontier
//! - Stopping on an exhausted page budget, an empty frontier or cancellation
//!
//! The frontier and graph locks are only taken for short in-memory updates,
//! never across a fetch or a robots.txt lookup.

use crate::config::CrawlConfig;
use crate::crawler::host::HostLimiter;
use crate::crawler::rate::GlobalRateLimiter;
use crate::fetch::{FetchError, FetchResponse, Fetcher};
use crate::frontier::{ClaimedEntry, EnqueueOutcome, Frontier};
use crate::graph::SharedGraph;
use crate::page::{normalize_page, DocumentParser, FormMethod};
use crate::policy::{CrawlPolicy, LinkVerdict, SkipReason};
use crate::url::{host_with_port, UrlKey};
use crate::WayfinderError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Longest backoff between two attempts on one URL
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How long an idle worker waits before looking at the frontier again
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Counters collected by the workers of one run
#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    /// Pages fetched and recorded in the graph
    pub pages_fetched: u64,
    /// Extra attempts after transient failures
    pub retries: u64,
    /// Links not enqueued, by reason
    pub skipped: BTreeMap<SkipReason, u64>,
    /// Terminal fetch failures, by error kind
    pub failure_kinds: BTreeMap<String, u64>,
}

/// Outcome of processing one claimed entry
enum EntryOutcome {
    Done,
    Failed,
    /// Cancelled mid-fetch; the entry stays in-flight
    Abandoned,
}

/// State shared by every worker of one run
pub struct CrawlContext {
    frontier: Arc<Mutex<Frontier>>,
    graph: SharedGraph,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn DocumentParser>,
    policy: Arc<CrawlPolicy>,
    hosts: HostLimiter,
    rate: GlobalRateLimiter,
    stats: Mutex<CrawlStats>,
    /// Entries claimed for fetching so far
    claimed: AtomicUsize,
    max_pages: usize,
    batch_size: usize,
    retry_budget: u32,
    retry_base_delay: Duration,
    request_timeout: Duration,
    /// Woken whenever an entry finishes and may have produced new work
    progress: Notify,
    cancel: CancellationToken,
    /// First internal invariant violation; stops the run
    fatal: Mutex<Option<WayfinderError>>,
    started: Instant,
}

impl CrawlContext {
    /// Creates the shared state for a run
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl bounds and politeness settings
    /// * `frontier` - Seeded frontier
    /// * `graph` - Empty flow graph
    /// * `fetcher` - Fetch collaborator
    /// * `parser` - HTML collaborator
    /// * `policy` - Scope and robots checks
    /// * `cancel` - Stops the workers when cancelled
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &CrawlConfig,
        frontier: Arc<Mutex<Frontier>>,
        graph: SharedGraph,
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn DocumentParser>,
        policy: Arc<CrawlPolicy>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            frontier,
            graph,
            fetcher,
            parser,
            policy,
            hosts: HostLimiter::new(
                config.per_host_concurrency as usize,
                config.min_host_interval(),
            ),
            rate: GlobalRateLimiter::new(config.global_rate_limit_per_sec),
            stats: Mutex::new(CrawlStats::default()),
            claimed: AtomicUsize::new(0),
            max_pages: config.max_pages as usize,
            batch_size: (config.batch_size as usize).max(1),
            retry_budget: config.retry_budget,
            retry_base_delay: config.retry_base_delay(),
            request_timeout: config.request_timeout(),
            progress: Notify::new(),
            cancel,
            fatal: Mutex::new(None),
            started: Instant::now(),
        }
    }

    /// Entries claimed for fetching so far
    pub fn claimed(&self) -> usize {
        self.claimed.load(Ordering::SeqCst)
    }

    /// True once the page budget allows no further claims
    pub fn budget_exhausted(&self) -> bool {
        self.claimed() >= self.max_pages
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats.lock().clone()
    }

    /// Takes the invariant violation that stopped the run, if any
    pub fn take_fatal(&self) -> Option<WayfinderError> {
        self.fatal.lock().take()
    }

    fn record_fatal(&self, error: WayfinderError) {
        tracing::error!("Stopping crawl: {}", error);
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
        self.cancel.cancel();
    }

    /// Claims the next batch under the frontier lock
    fn claim(&self) -> Claim {
        let mut frontier = self.frontier.lock();
        let remaining = self.max_pages.saturating_sub(self.claimed());
        if remaining == 0 {
            return Claim::Exit;
        }

        let batch = frontier.next_batch(self.batch_size.min(remaining));
        if !batch.is_empty() {
            self.claimed.fetch_add(batch.len(), Ordering::SeqCst);
            return Claim::Batch(batch);
        }

        if frontier.has_pending_work() {
            Claim::Wait
        } else {
            Claim::Exit
        }
    }
}

enum Claim {
    Batch(Vec<ClaimedEntry>),
    /// Nothing queued yet, but in-flight entries may still add links
    Wait,
    Exit,
}

/// Runs `worker_count` workers until the crawl stops
///
/// Returns when every worker has exited: the frontier ran dry, the page
/// budget was used up, or the context's token was cancelled.
pub async fn run_workers(ctx: Arc<CrawlContext>, worker_count: usize) -> CrawlStats {
    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count.max(1) {
        let ctx = ctx.clone();
        workers.spawn(async move { worker_loop(ctx, worker_id).await });
    }

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!("Crawl worker stopped abnormally: {}", e);
        }
    }

    let stats = ctx.stats();
    tracing::info!(
        "Workers finished: {} pages fetched, {} retries in {:?}",
        stats.pages_fetched,
        stats.retries,
        ctx.started.elapsed()
    );
    stats
}

async fn worker_loop(ctx: Arc<CrawlContext>, worker_id: usize) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let batch = match ctx.claim() {
            Claim::Batch(batch) => batch,
            Claim::Exit => break,
            Claim::Wait => {
                tokio::select! {
                    _ = ctx.progress.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                    _ = ctx.cancel.cancelled() => break,
                }
                continue;
            }
        };

        for entry in batch {
            // Cancelled entries of this batch stay in-flight
            if ctx.cancel.is_cancelled() {
                break;
            }
            match process_entry(&ctx, &entry).await {
                EntryOutcome::Done | EntryOutcome::Failed => {
                    ctx.progress.notify_waiters();
                    report_progress(&ctx);
                }
                EntryOutcome::Abandoned => {
                    tracing::debug!("Abandoned in-flight fetch of {}", entry.key);
                }
            }
        }
    }

    tracing::debug!("Worker {} exiting", worker_id);
}

fn report_progress(ctx: &CrawlContext) {
    let finished = {
        let stats = ctx.stats.lock();
        stats.pages_fetched + stats.failure_kinds.values().sum::<u64>()
    };
    if finished > 0 && finished % 10 == 0 {
        let counts = ctx.frontier.lock().counts();
        let rate = finished as f64 / ctx.started.elapsed().as_secs_f64().max(0.001);
        tracing::info!(
            "Progress: {} pages crawled, {} queued, {} failed, {:.2} pages/sec",
            counts.done,
            counts.queued,
            counts.failed,
            rate
        );
    }
}

/// Fetches one claimed entry and records the result
async fn process_entry(ctx: &CrawlContext, entry: &ClaimedEntry) -> EntryOutcome {
    tracing::debug!("Processing {} (depth {})", entry.key, entry.depth);

    let fetched = tokio::select! {
        _ = ctx.cancel.cancelled() => return EntryOutcome::Abandoned,
        result = fetch_with_retry(ctx, &entry.url) => result,
    };

    match fetched {
        Ok(response) => match record_success(ctx, entry, &response).await {
            Ok(outcome) => outcome,
            Err(e) => {
                ctx.record_fatal(e);
                EntryOutcome::Abandoned
            }
        },
        Err(error) => match record_failure(ctx, entry, &error) {
            Ok(()) => EntryOutcome::Failed,
            Err(e) => {
                ctx.record_fatal(e);
                EntryOutcome::Abandoned
            }
        },
    }
}

/// Fetches `url` under both limiters, retrying transient failures
///
/// Attempt `n` (counting from zero) is followed by a backoff of
/// `base * 2^n`, capped at [`MAX_BACKOFF`]. The host slot is released
/// while backing off so other URLs of that host can proceed.
async fn fetch_with_retry(ctx: &CrawlContext, url: &Url) -> Result<FetchResponse, FetchError> {
    let host = host_with_port(url).unwrap_or_default();

    if let Some(delay) = ctx.policy.crawl_delay(url, ctx.fetcher.as_ref()).await {
        ctx.hosts.raise_min_interval(&host, delay);
    }

    let mut attempt: u32 = 0;
    loop {
        ctx.rate.acquire().await;
        let result = {
            let _permit = ctx.hosts.acquire(&host).await;
            ctx.fetcher.fetch(url, ctx.request_timeout).await
        };

        match result {
            Ok(response) => {
                tracing::debug!(
                    "Fetched {} -> {} ({}, {} ms)",
                    url,
                    response.final_url,
                    response.status,
                    response.elapsed_ms
                );
                return Ok(response);
            }
            Err(error) if error.is_retryable() && attempt < ctx.retry_budget => {
                let delay = backoff_delay(ctx.retry_base_delay, attempt);
                attempt += 1;
                ctx.stats.lock().retries += 1;
                tracing::warn!(
                    "Fetch of {} failed ({}), retry {}/{} in {:?}",
                    url,
                    error,
                    attempt,
                    ctx.retry_budget,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Backoff before the retry that follows attempt `attempt`
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

async fn record_success(
    ctx: &CrawlContext,
    entry: &ClaimedEntry,
    response: &FetchResponse,
) -> Result<EntryOutcome, WayfinderError> {
    if let Some((hop, reason)) = redirect_violation(ctx, entry, response).await {
        record_denied_redirect(ctx, entry, &hop, reason)?;
        return Ok(EntryOutcome::Failed);
    }

    let page = normalize_page(&entry.key, response, ctx.parser.as_ref());
    if let Some(error) = &page.error {
        tracing::warn!("Could not parse {}: {}", entry.key, error);
    }

    ctx.graph.write().record_page(&page, entry.depth)?;

    if page.key != entry.key {
        let mut frontier = ctx.frontier.lock();
        frontier.record_redirect_target(&page.key, entry.depth, entry.parent.as_ref());
    }

    let mut discovered: Vec<&UrlKey> = page.links.iter().collect();
    discovered.extend(
        page.forms
            .iter()
            .filter(|form| form.method == FormMethod::Get && !page.answers_to(&form.action))
            .map(|form| &form.action),
    );

    let mut added = 0usize;
    for target in discovered {
        let Ok(url) = target.to_url() else {
            continue;
        };
        // No lock is held here: the robots lookup may fetch
        match ctx.policy.check(&url, ctx.fetcher.as_ref()).await {
            LinkVerdict::Allowed => {
                let outcome = ctx
                    .frontier
                    .lock()
                    .enqueue(target.as_str(), entry.depth, Some(&page.key));
                match outcome {
                    Ok(EnqueueOutcome::Added(_)) => added += 1,
                    Ok(EnqueueOutcome::Known(_)) => {}
                    Ok(EnqueueOutcome::DepthExceeded(key)) => {
                        ctx.graph.write().mark_bounded(&key);
                        count_skip(ctx, SkipReason::DepthExceeded);
                    }
                    Err(e) => tracing::debug!("Dropping link {}: {}", target, e),
                }
            }
            LinkVerdict::Skipped(reason) => {
                tracing::trace!("Skipping {} ({})", target, reason.as_str());
                count_skip(ctx, reason);
            }
        }
    }

    ctx.frontier.lock().mark_done(&entry.key, true)?;
    ctx.stats.lock().pages_fetched += 1;

    tracing::debug!(
        "Recorded {} with {} links and {} forms, {} new URLs queued",
        page.key,
        page.links.len(),
        page.forms.len(),
        added
    );
    Ok(EntryOutcome::Done)
}

/// First redirect hop the crawl policy would not have enqueued as a link
///
/// Configured entry URLs are followed wherever they redirect. Every other
/// entry gets the static checks on each hop and the robots check on the
/// final URL.
async fn redirect_violation(
    ctx: &CrawlContext,
    entry: &ClaimedEntry,
    response: &FetchResponse,
) -> Option<(Url, SkipReason)> {
    if entry.parent.is_none() || response.redirects.is_empty() {
        return None;
    }

    for hop in &response.redirects {
        let verdict = if hop == &response.final_url {
            ctx.policy.check(hop, ctx.fetcher.as_ref()).await
        } else {
            ctx.policy.check_static(hop)
        };
        if let LinkVerdict::Skipped(reason) = verdict {
            return Some((hop.clone(), reason));
        }
    }
    None
}

/// Drops a page whose redirect left the crawl policy
///
/// The entry is failed with the policy reason and edges to it point at the
/// external sink; no node is created for the redirect target.
fn record_denied_redirect(
    ctx: &CrawlContext,
    entry: &ClaimedEntry,
    hop: &Url,
    reason: SkipReason,
) -> Result<(), WayfinderError> {
    tracing::info!("Not recording {}: redirected to {} ({})", entry.key, hop, reason);

    ctx.frontier
        .lock()
        .mark_failed(&entry.key, format!("redirected to {} ({})", hop, reason))?;
    ctx.graph.write().mark_out_of_scope(&entry.key);
    count_skip(ctx, reason);
    *ctx
        .stats
        .lock()
        .failure_kinds
        .entry("redirect_denied".to_string())
        .or_insert(0) += 1;
    Ok(())
}

fn record_failure(
    ctx: &CrawlContext,
    entry: &ClaimedEntry,
    error: &FetchError,
) -> Result<(), WayfinderError> {
    tracing::warn!("Giving up on {}: {}", entry.key, error);

    ctx.frontier.lock().mark_failed(&entry.key, error.to_string())?;
    ctx.graph.write().mark_failed(&entry.key);
    *ctx
        .stats
        .lock()
        .failure_kinds
        .entry(error.kind().to_string())
        .or_insert(0) += 1;
    Ok(())
}

fn count_skip(ctx: &CrawlContext, reason: SkipReason) {
    *ctx.stats.lock().skipped.entry(reason).or_insert(0) += 1;
}
