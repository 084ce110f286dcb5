//! Report module for the output artifact of a run
//!
//! This module handles:
//! - Assembling the serializable report from the frontier, graph and synthesis
//! - Writing it as JSON, Markdown or a SQLite database
//! - Printing a console summary

mod json;
mod markdown;
mod sqlite;
pub mod stats;

pub use json::{to_json_string, write_json};
pub use markdown::{format_markdown_report, write_markdown};
pub use sqlite::{export_sqlite, SCHEMA_SQL};
pub use stats::print_summary;

use crate::config::AnnotationRole;
use crate::crawler::{CrawlStats, RunStatus};
use crate::frontier::{EntryState, Frontier, FrontierCounts};
use crate::graph::{GraphSnapshot, GraphStats, NodeId};
use crate::page::PageStatus;
use crate::policy::SkipReason;
use crate::synth::{Flow, SynthesisOutput, SynthesisWarning, TestRequirement};
use crate::url::UrlKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while writing a report
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Run metadata
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    /// SHA-256 of the configuration file, when one was loaded
    pub config_hash: Option<String>,
    pub entry_urls: Vec<UrlKey>,
}

/// A frontier entry that ended `failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub key: UrlKey,
    pub reason: String,
}

/// Where the frontier stood when the run ended
#[derive(Debug, Clone, Serialize)]
pub struct FrontierSummary {
    pub counts: FrontierCounts,
    /// done + failed + queued + in-flight equals every entry ever created
    pub conserved: bool,
    /// Entries left queued because a bound stopped the run
    pub unvisited: Vec<UrlKey>,
    /// Entries whose fetch was abandoned at cancellation
    pub in_flight_at_cutoff: Vec<UrlKey>,
    pub failures: Vec<FailureRecord>,
    /// Terminal fetch failures by error kind
    pub failure_reasons: BTreeMap<String, u64>,
    /// Links not enqueued, by reason
    pub skipped: BTreeMap<SkipReason, u64>,
    pub retries: u64,
}

impl FrontierSummary {
    /// Summarizes a frontier and the worker counters
    pub fn collect(frontier: &Frontier, stats: &CrawlStats) -> Self {
        let counts = frontier.counts();
        let keys = |state: EntryState| -> Vec<UrlKey> {
            frontier
                .entries_in(state)
                .into_iter()
                .map(|entry| entry.key.clone())
                .collect()
        };

        Self {
            counts,
            conserved: counts.is_conserved(),
            unvisited: keys(EntryState::Queued),
            in_flight_at_cutoff: keys(EntryState::InFlight),
            failures: frontier
                .entries_in(EntryState::Failed)
                .into_iter()
                .map(|entry| FailureRecord {
                    key: entry.key.clone(),
                    reason: entry
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                })
                .collect(),
            failure_reasons: stats.failure_kinds.clone(),
            skipped: stats.skipped.clone(),
            retries: stats.retries,
        }
    }

    /// Total links skipped for any reason
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }
}

/// One page node as it appears in the report
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub id: NodeId,
    pub key: UrlKey,
    pub title: Option<String>,
    pub depth: u32,
    pub status: Option<PageStatus>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub out_degree: usize,
    pub forms: usize,
    pub revisits: u32,
    pub role: Option<AnnotationRole>,
    pub error: Option<String>,
}

/// The output artifact of one run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run: RunInfo,
    pub frontier: FrontierSummary,
    pub graph: GraphStats,
    pub pages: Vec<PageSummary>,
    pub flows: Vec<Flow>,
    pub requirements: Vec<TestRequirement>,
    pub warnings: Vec<SynthesisWarning>,
    pub flow_cap_hit: bool,
}

impl CrawlReport {
    /// Assembles the report of a finished run
    ///
    /// # Arguments
    ///
    /// * `run` - Run metadata
    /// * `frontier` - Frontier summary at the end of the run
    /// * `snapshot` - The sealed graph the synthesizer walked
    /// * `synthesis` - Flows, requirements and warnings
    pub fn assemble(
        run: RunInfo,
        frontier: FrontierSummary,
        snapshot: &GraphSnapshot,
        synthesis: SynthesisOutput,
    ) -> Self {
        let mut pages: Vec<PageSummary> = snapshot
            .pages()
            .map(|node| PageSummary {
                id: node.id,
                key: node.key.clone(),
                title: node.title.clone(),
                depth: node.depth,
                status: node.status,
                status_code: node.status_code,
                content_type: node.content_type.clone(),
                out_degree: snapshot.out_degree(node.id),
                forms: node.forms.len(),
                revisits: node.revisits,
                role: node.annotation.as_ref().map(|annotation| annotation.role),
                error: node.error.clone(),
            })
            .collect();
        pages.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.key.cmp(&b.key)));

        Self {
            run,
            frontier,
            graph: snapshot.stats(),
            pages,
            flows: synthesis.flows,
            requirements: synthesis.requirements,
            warnings: synthesis.warnings,
            flow_cap_hit: synthesis.flow_cap_hit,
        }
    }

    /// Requirements generated for one flow
    pub fn requirements_for<'a>(&'a self, flow_id: &'a str) -> impl Iterator<Item = &'a TestRequirement> + 'a {
        self.requirements
            .iter()
            .filter(move |requirement| requirement.flow_id == flow_id)
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_assemble_orders_pages_by_depth() {
        let report = fixtures::create_test_report().await;
        assert_eq!(report.pages.len(), 3);
        assert_eq!(report.pages[0].key.as_str(), "https://example.com/home");
        assert_eq!(report.pages[0].out_degree, 2);
        assert_eq!(report.graph.form_edges, 1);
    }

    #[tokio::test]
    async fn test_frontier_summary_lists_unvisited() {
        let report = fixtures::create_test_report().await;
        assert!(report.frontier.conserved);
        assert_eq!(report.frontier.counts.queued, 2);
        assert_eq!(report.frontier.unvisited.len(), 2);
        assert!(report.frontier.in_flight_at_cutoff.is_empty());
    }

    #[tokio::test]
    async fn test_requirements_for_flow() {
        let report = fixtures::create_test_report().await;
        let form_flow = report
            .flows
            .iter()
            .find(|flow| flow.form_steps().count() > 0)
            .unwrap();
        assert_eq!(report.requirements_for(&form_flow.id).count(), 2);
    }
}
