//! Flow Graph Builder
//!
//! This module handles:
//! - An arena of page nodes indexed by URL Key, plus external, failed and
//!   unvisited sinks
//! - Idempotent link and form-submit edges between nodes
//! - Pending edges to targets that have not been fetched yet
//! - Immutable snapshots for the flow synthesizer
//!
//! The crawler shares one [`FlowGraph`] between workers as
//! `Arc<parking_lot::RwLock<FlowGraph>>`; every mutation is a short in-memory
//! section and no lock is held across a fetch.

mod builder;
mod model;
mod snapshot;

pub use builder::{EdgeStatus, FlowGraph, EXTERNAL_SINK, FAILED_SINK, UNVISITED_SINK};
pub use model::{Annotation, Edge, NodeId, NodeKind, PageNode, Trigger};
pub use snapshot::{GraphSnapshot, GraphStats};

use crate::url::UrlKey;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

/// Graph invariant violation; always an implementation bug
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("edge source {0} is not a page node")]
    UnknownSource(NodeId),

    #[error("duplicate node for {0}")]
    DuplicateNode(UrlKey),

    #[error("edge references missing node {0}")]
    DanglingEdge(NodeId),
}

/// Graph handle shared by crawl workers
pub type SharedGraph = Arc<RwLock<FlowGraph>>;
