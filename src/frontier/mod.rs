//! Frontier & Dedup Store
//!
//! This module handles:
//! - Canonicalizing discovered URLs into URL Keys
//! - Keeping at most one entry per key for the whole run
//! - Handing out breadth-first batches of queued work
//! - Enforcing monotonic entry state transitions
//!
//! The store is plain data; the crawler shares it between workers behind a
//! `parking_lot::Mutex` and never holds that lock across a fetch.

mod entry;

pub use entry::{EntryState, FrontierEntry};

use crate::url::{canonicalize_url, UrlKey};
use crate::UrlResult;
use entry::QueueSlot;
use serde::Serialize;
use std::collections::{BinaryHeap, HashMap};
use thiserror::Error;
use url::Url;

/// Frontier misuse; always a bug in the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontierError {
    #[error("no frontier entry for {0}")]
    UnknownKey(UrlKey),

    #[error("invalid transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: UrlKey,
        from: EntryState,
        to: EntryState,
    },
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new entry was created in state `queued`
    Added(UrlKey),
    /// The key already had an entry
    Known(UrlKey),
    /// The entry would sit deeper than the maximum depth; nothing was created
    DepthExceeded(UrlKey),
}

impl EnqueueOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, EnqueueOutcome::Added(_))
    }

    pub fn key(&self) -> &UrlKey {
        match self {
            EnqueueOutcome::Added(key)
            | EnqueueOutcome::Known(key)
            | EnqueueOutcome::DepthExceeded(key) => key,
        }
    }
}

/// An entry handed to a worker by [`Frontier::next_batch`]
#[derive(Debug, Clone)]
pub struct ClaimedEntry {
    pub key: UrlKey,
    pub url: Url,
    pub depth: u32,
    pub parent: Option<UrlKey>,
}

/// Entry counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrontierCounts {
    pub queued: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
    /// Entries ever created
    pub total: usize,
}

impl FrontierCounts {
    /// Every created entry is in exactly one state
    pub fn is_conserved(&self) -> bool {
        self.queued + self.in_flight + self.done + self.failed == self.total
    }
}

/// The work queue and the discovered-URL set of one crawl run
#[derive(Debug)]
pub struct Frontier {
    entries: HashMap<UrlKey, FrontierEntry>,
    queue: BinaryHeap<QueueSlot>,
    max_depth: u32,
    next_seq: u64,
    created: usize,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Entries deeper than this are rejected
    pub fn new(max_depth: u32) -> Self {
        Self {
            entries: HashMap::new(),
            queue: BinaryHeap::new(),
            max_depth,
            next_seq: 0,
            created: 0,
        }
    }

    /// Adds an entry URL at depth 0
    pub fn enqueue_seed(&mut self, raw: &str) -> UrlResult<EnqueueOutcome> {
        let url = canonicalize_url(raw)?;
        Ok(self.offer(url, 0, None))
    }

    /// Offers a URL discovered on a page at `parent_depth`
    ///
    /// # Arguments
    ///
    /// * `raw` - The discovered URL, canonicalized here
    /// * `parent_depth` - Depth of the page the URL was found on
    /// * `parent` - Key of that page
    ///
    /// # Returns
    ///
    /// * `Ok(EnqueueOutcome::Added)` - A new entry was queued at `parent_depth + 1`
    /// * `Ok(EnqueueOutcome::Known)` - The key was already known
    /// * `Ok(EnqueueOutcome::DepthExceeded)` - Rejected, no entry was created
    /// * `Err(UrlError)` - The URL cannot be canonicalized
    pub fn enqueue(
        &mut self,
        raw: &str,
        parent_depth: u32,
        parent: Option<&UrlKey>,
    ) -> UrlResult<EnqueueOutcome> {
        let url = canonicalize_url(raw)?;
        Ok(self.offer(url, parent_depth.saturating_add(1), parent.cloned()))
    }

    fn offer(&mut self, url: Url, depth: u32, parent: Option<UrlKey>) -> EnqueueOutcome {
        let key = UrlKey::from_canonical(&url);

        if self.entries.contains_key(&key) {
            return EnqueueOutcome::Known(key);
        }

        if depth > self.max_depth {
            return EnqueueOutcome::DepthExceeded(key);
        }

        let seq = self.bump_seq();
        self.entries.insert(
            key.clone(),
            FrontierEntry {
                key: key.clone(),
                url,
                depth,
                parent,
                state: EntryState::Queued,
                seq,
                failure_reason: None,
            },
        );
        self.queue.push(QueueSlot {
            depth,
            seq,
            key: key.clone(),
        });
        self.created += 1;

        EnqueueOutcome::Added(key)
    }

    /// Registers the landing URL of a redirect as already fetched
    ///
    /// The response was just processed under the requested key, so the final
    /// key must never be scheduled on its own. Returns true if an entry was
    /// created.
    pub fn record_redirect_target(
        &mut self,
        target: &UrlKey,
        depth: u32,
        parent: Option<&UrlKey>,
    ) -> bool {
        if self.entries.contains_key(target) {
            return false;
        }
        let Ok(url) = target.to_url() else {
            return false;
        };

        let seq = self.bump_seq();
        self.entries.insert(
            target.clone(),
            FrontierEntry {
                key: target.clone(),
                url,
                depth,
                parent: parent.cloned(),
                state: EntryState::Done,
                seq,
                failure_reason: None,
            },
        );
        self.created += 1;
        true
    }

    /// Claims up to `n` queued entries, shallowest first, and marks them in-flight
    pub fn next_batch(&mut self, n: usize) -> Vec<ClaimedEntry> {
        let mut batch = Vec::with_capacity(n.min(self.queue.len()));

        while batch.len() < n {
            let Some(slot) = self.queue.pop() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(&slot.key) else {
                continue;
            };
            if entry.state != EntryState::Queued {
                continue;
            }

            entry.state = EntryState::InFlight;
            batch.push(ClaimedEntry {
                key: entry.key.clone(),
                url: entry.url.clone(),
                depth: entry.depth,
                parent: entry.parent.clone(),
            });
        }

        batch
    }

    /// Finishes an in-flight entry
    ///
    /// # Arguments
    ///
    /// * `key` - The claimed entry
    /// * `success` - `done` when true, `failed` otherwise
    pub fn mark_done(&mut self, key: &UrlKey, success: bool) -> Result<(), FrontierError> {
        let next = if success {
            EntryState::Done
        } else {
            EntryState::Failed
        };

        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| FrontierError::UnknownKey(key.clone()))?;

        if !entry.state.can_transition_to(next) {
            return Err(FrontierError::InvalidTransition {
                key: key.clone(),
                from: entry.state,
                to: next,
            });
        }

        entry.state = next;
        Ok(())
    }

    /// Marks an in-flight entry failed and records why
    pub fn mark_failed(&mut self, key: &UrlKey, reason: impl Into<String>) -> Result<(), FrontierError> {
        self.mark_done(key, false)?;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.failure_reason = Some(reason.into());
        }
        Ok(())
    }

    pub fn get(&self, key: &UrlKey) -> Option<&FrontierEntry> {
        self.entries.get(key)
    }

    pub fn state_of(&self, key: &UrlKey) -> Option<EntryState> {
        self.entries.get(key).map(|entry| entry.state)
    }

    /// Counts entries by state
    pub fn counts(&self) -> FrontierCounts {
        let mut counts = FrontierCounts {
            total: self.created,
            ..FrontierCounts::default()
        };
        for entry in self.entries.values() {
            match entry.state {
                EntryState::Queued => counts.queued += 1,
                EntryState::InFlight => counts.in_flight += 1,
                EntryState::Done => counts.done += 1,
                EntryState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.state == EntryState::InFlight)
            .count()
    }

    /// True while any entry is queued or in-flight
    pub fn has_pending_work(&self) -> bool {
        self.has_queued() || self.in_flight() > 0
    }

    /// Entries in `state`, in discovery order
    pub fn entries_in(&self, state: EntryState) -> Vec<&FrontierEntry> {
        let mut entries: Vec<&FrontierEntry> = self
            .entries
            .values()
            .filter(|entry| entry.state == state)
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}
