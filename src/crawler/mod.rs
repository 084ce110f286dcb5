//! Crawler module for driving a crawl run
//!
//! This module contains the crawl run logic, including:
//! - Per-host and global politeness limiters
//! - The worker pool that fetches, normalizes and records pages
//! - The run driver that seeds, bounds, cancels and reports a run

mod coordinator;
mod host;
mod rate;
mod scheduler;

pub use coordinator::{run_crawl, CrawlRun};
pub use host::{HostLimiter, HostPermit};
pub use rate::GlobalRateLimiter;
pub use scheduler::{run_workers, CrawlContext, CrawlStats};

use serde::Serialize;
use std::fmt;

/// Why a run stopped before its frontier was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The page budget was used up with entries still queued
    MaxPages,
    /// The wall-clock budget ran out
    WallClock,
    /// The run was cancelled from outside
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxPages => "max_pages",
            StopReason::WallClock => "wall_clock",
            StopReason::Cancelled => "cancelled",
        }
    }
}

/// Final status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every reachable in-scope page within the bounds was processed
    Completed,
    /// A bound or cancellation stopped the run; results cover what was found
    Partial(StopReason),
    /// Every entry URL failed
    Failed,
}

impl RunStatus {
    pub fn is_partial(&self) -> bool {
        matches!(self, RunStatus::Partial(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Partial(reason) => write!(f, "partial ({})", reason.as_str()),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}
