//! Crawl run driver
//!
//! This module contains the top-level run logic, including:
//! - Building fresh frontier and graph stores for each run
//! - Seeding the entry URLs and resolving page annotations
//! - Enforcing the wall-clock budget and external cancellation
//! - Sealing the graph, synthesizing flows and assembling the report

use crate::config::{validate, Config};
use crate::crawler::scheduler::{run_workers, CrawlContext};
use crate::crawler::{RunStatus, StopReason};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::frontier::{EntryState, Frontier};
use crate::graph::{Annotation, FlowGraph, SharedGraph};
use crate::page::{DocumentParser, HtmlDocumentParser};
use crate::policy::CrawlPolicy;
use crate::report::{CrawlReport, FrontierSummary, RunInfo};
use crate::synth::{StoryPhraser, Synthesizer, TemplatePhraser};
use crate::url::{canonicalize, UrlKey};
use crate::WayfinderError;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One crawl-and-synthesis run
///
/// Every run owns fresh stores, so several runs can execute in one process.
pub struct CrawlRun {
    config: Config,
    config_hash: Option<String>,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn DocumentParser>,
    phraser: Arc<dyn StoryPhraser>,
    cancel: CancellationToken,
}

impl CrawlRun {
    /// Creates a run with the HTTP fetcher, HTML parser and template phraser
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration; validated here
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlRun)` - Ready to execute
    /// * `Err(WayfinderError)` - Invalid configuration or HTTP client setup failure
    pub fn new(config: Config) -> Result<Self, WayfinderError> {
        validate(&config)?;
        let fetcher = HttpFetcher::from_config(&config.user_agent, &config.crawl)?;

        Ok(Self {
            config,
            config_hash: None,
            fetcher: Arc::new(fetcher),
            parser: Arc::new(HtmlDocumentParser::new()),
            phraser: Arc::new(TemplatePhraser),
            cancel: CancellationToken::new(),
        })
    }

    /// Replaces the fetch collaborator
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replaces the HTML collaborator
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the language-generation collaborator
    pub fn with_phraser(mut self, phraser: Arc<dyn StoryPhraser>) -> Self {
        self.phraser = phraser;
        self
    }

    /// Records the hash of the configuration file in the report
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Token that cancels this run when triggered
    ///
    /// In-flight fetches are abandoned and their entries reported as
    /// in-flight; synthesis still runs on what was found.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawls, builds the flow graph and synthesizes test requirements
    ///
    /// Bounds and cancellation do not make this fail; they yield a report
    /// whose status is partial. Errors are reserved for broken invariants.
    pub async fn execute(self) -> Result<CrawlReport, WayfinderError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let crawl = &self.config.crawl;

        let annotations = resolve_annotations(&self.config)?;

        let mut frontier = Frontier::new(crawl.max_depth);
        let mut entry_keys: Vec<UrlKey> = Vec::new();
        for raw in &crawl.entry_urls {
            let outcome = frontier.enqueue_seed(raw)?;
            if !entry_keys.contains(outcome.key()) {
                entry_keys.push(outcome.key().clone());
            }
        }

        tracing::info!(
            "Starting crawl of {} entry URLs (max depth {}, max pages {}, {} workers)",
            entry_keys.len(),
            crawl.max_depth,
            crawl.max_pages,
            crawl.worker_count
        );

        let frontier = Arc::new(Mutex::new(frontier));
        let graph: SharedGraph = Arc::new(RwLock::new(FlowGraph::new(annotations)));
        let policy = Arc::new(CrawlPolicy::from_config(&self.config));

        let worker_token = self.cancel.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));
        let timer = crawl.wall_clock_budget().map(|budget| {
            let token = worker_token.clone();
            let flag = timed_out.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(budget) => {
                        tracing::warn!("Wall-clock budget of {:?} reached, stopping crawl", budget);
                        flag.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let ctx = Arc::new(CrawlContext::new(
            crawl,
            frontier.clone(),
            graph.clone(),
            self.fetcher.clone(),
            self.parser.clone(),
            policy,
            worker_token.clone(),
        ));
        let stats = run_workers(ctx.clone(), crawl.worker_count as usize).await;

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(error) = ctx.take_fatal() {
            return Err(error);
        }

        let (summary, status, unvisited) = {
            let frontier = frontier.lock();
            let status = determine_status(
                &frontier,
                &entry_keys,
                self.cancel.is_cancelled(),
                timed_out.load(Ordering::SeqCst),
            );
            let unvisited: Vec<UrlKey> = frontier
                .entries_in(EntryState::Queued)
                .into_iter()
                .chain(frontier.entries_in(EntryState::InFlight))
                .map(|entry| entry.key.clone())
                .collect();
            (FrontierSummary::collect(&frontier, &stats), status, unvisited)
        };

        let snapshot = {
            let mut graph = graph.write();
            // Admitted but never fetched because a bound stopped the crawl
            for key in &unvisited {
                graph.mark_bounded(key);
            }
            graph.seal();
            graph.snapshot()
        };
        snapshot.check_invariants()?;

        let synthesizer = Synthesizer::new(
            self.phraser.clone(),
            crawl.max_flow_length as usize,
            crawl.max_flows as usize,
        );
        let synthesis = synthesizer.synthesize(&snapshot, &entry_keys).await;

        let duration = clock.elapsed();
        tracing::info!(
            "Crawl {}: {} done, {} failed, {} not visited, {} flows, {} requirements in {:?}",
            status,
            summary.counts.done,
            summary.counts.failed,
            summary.counts.queued,
            synthesis.flows.len(),
            synthesis.requirements.len(),
            duration
        );

        let run = RunInfo {
            started_at,
            finished_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            status,
            config_hash: self.config_hash.clone(),
            entry_urls: entry_keys,
        };

        Ok(CrawlReport::assemble(run, summary, &snapshot, synthesis))
    }
}

/// Canonicalizes annotation URLs into graph annotations
fn resolve_annotations(config: &Config) -> Result<HashMap<UrlKey, Annotation>, WayfinderError> {
    let mut annotations = HashMap::new();
    for entry in &config.annotations {
        let key = canonicalize(&entry.url)?;
        annotations.insert(
            key,
            Annotation {
                role: entry.role,
                label: entry.label.clone(),
            },
        );
    }
    Ok(annotations)
}

/// Derives the run status from where the frontier stopped
///
/// A run fails only when every entry URL failed. Otherwise any cutoff is
/// partial, with external cancellation taking precedence over the clock.
fn determine_status(
    frontier: &Frontier,
    entry_keys: &[UrlKey],
    cancelled: bool,
    timed_out: bool,
) -> RunStatus {
    let all_entries_failed = !entry_keys.is_empty()
        && entry_keys
            .iter()
            .all(|key| frontier.state_of(key) == Some(EntryState::Failed));

    if all_entries_failed {
        RunStatus::Failed
    } else if cancelled {
        RunStatus::Partial(StopReason::Cancelled)
    } else if timed_out {
        RunStatus::Partial(StopReason::WallClock)
    } else if frontier.has_queued() || frontier.in_flight() > 0 {
        RunStatus::Partial(StopReason::MaxPages)
    } else {
        RunStatus::Completed
    }
}

/// Runs a complete crawl with the default collaborators
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run finished, possibly partially
/// * `Err(WayfinderError)` - Invalid configuration or an internal invariant broke
pub async fn run_crawl(config: Config) -> Result<CrawlReport, WayfinderError> {
    CrawlRun::new(config)?.execute().await
}
