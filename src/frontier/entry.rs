//! Frontier entry states
//!
//! An entry only ever moves forward: queued → in-flight → done | failed.

use crate::url::UrlKey;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use url::Url;

/// Lifecycle state of a Frontier Entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting to be claimed by a worker
    Queued,

    /// Claimed by a worker; a fetch is pending or was abandoned at cutoff
    InFlight,

    /// Fetched successfully (including pages that failed to parse)
    Done,

    /// Fetch failed after exhausting the retry budget
    Failed,
}

impl EntryState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `self → next` is a legal transition
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::InFlight) | (Self::InFlight, Self::Done) | (Self::InFlight, Self::Failed)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all_states() -> &'static [EntryState] {
        &[Self::Queued, Self::InFlight, Self::Done, Self::Failed]
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// The frontier's record of one URL Key
#[derive(Debug, Clone, Serialize)]
pub struct FrontierEntry {
    pub key: UrlKey,
    #[serde(skip)]
    pub url: Url,
    pub depth: u32,
    pub parent: Option<UrlKey>,
    pub state: EntryState,
    /// Discovery order, unique per run
    pub seq: u64,
    pub failure_reason: Option<String>,
}

/// Heap slot for a queued entry
///
/// Ordered so the `BinaryHeap` pops the shallowest, earliest-discovered entry first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueSlot {
    pub depth: u32,
    pub seq: u64,
    pub key: UrlKey,
}

impl Ord for QueueSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison so lower depth, then lower seq, come first
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
