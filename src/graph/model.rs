use crate::config::AnnotationRole;
use crate::page::{FormDescriptor, PageStatus};
use crate::url::UrlKey;
use serde::Serialize;
use std::fmt;

/// Index of a node in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A fetched page
    Page,
    /// Sink for targets outside the crawl scope
    External,
    /// Sink for in-scope targets left unfetched when a crawl bound was hit
    Unvisited,
    /// Sink for targets whose fetch failed
    Failed,
}

impl NodeKind {
    pub fn is_sink(&self) -> bool {
        !matches!(self, NodeKind::Page)
    }
}

/// Externally supplied role of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub role: AnnotationRole,
    pub label: Option<String>,
}

/// A node of the flow graph
#[derive(Debug, Clone, Serialize)]
pub struct PageNode {
    pub id: NodeId,
    pub key: UrlKey,
    pub kind: NodeKind,
    pub title: Option<String>,
    pub fingerprint: Option<String>,
    /// Link targets as observed on the page
    pub outbound: Vec<UrlKey>,
    pub forms: Vec<FormDescriptor>,
    pub depth: u32,
    pub status: Option<PageStatus>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    /// Times the page was observed again after creation
    pub revisits: u32,
    pub annotation: Option<Annotation>,
    pub error: Option<String>,
}

impl PageNode {
    pub(crate) fn sink(id: NodeId, kind: NodeKind) -> Self {
        let name = match kind {
            NodeKind::Failed => "failed",
            NodeKind::Unvisited => "unvisited",
            _ => "external",
        };
        Self {
            id,
            key: UrlKey::synthetic(name),
            kind,
            title: None,
            fingerprint: None,
            outbound: Vec::new(),
            forms: Vec::new(),
            depth: 0,
            status: None,
            status_code: None,
            content_type: None,
            revisits: 0,
            annotation: None,
            error: None,
        }
    }

    pub fn is_sink(&self) -> bool {
        self.kind.is_sink()
    }

    pub fn is_goal(&self) -> bool {
        matches!(
            self.annotation,
            Some(Annotation {
                role: AnnotationRole::Goal,
                ..
            })
        )
    }

    pub fn is_annotated_entry(&self) -> bool {
        matches!(
            self.annotation,
            Some(Annotation {
                role: AnnotationRole::Entry,
                ..
            })
        )
    }

    /// Title if there is one, else the path of the key
    pub fn label(&self) -> String {
        match (&self.kind, &self.title) {
            (NodeKind::External, _) => "external site".to_string(),
            (NodeKind::Failed, _) => "unreachable page".to_string(),
            (NodeKind::Unvisited, _) => "page not visited due to crawl bound".to_string(),
            (NodeKind::Page, Some(title)) => title.clone(),
            (NodeKind::Page, None) => self.key.display_path(),
        }
    }
}

/// What the visitor does to follow an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Link,
    /// Submits the source page's form at this index
    FormSubmit { form: usize },
}

impl Trigger {
    pub fn is_form(&self) -> bool {
        matches!(self, Trigger::FormSubmit { .. })
    }
}

/// A transition between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub trigger: Trigger,
    /// Key the trigger pointed at, before alias resolution
    pub target: UrlKey,
    /// Position of the trigger on the source page; orders outgoing edges
    pub order: u32,
}

/// Deduplication identity of an edge
///
/// Edges into a page node are identified by the node; edges into a sink keep
/// their target key so distinct off-site links stay distinct.
pub(crate) type EdgeIdentity = (NodeId, Trigger, NodeId, Option<UrlKey>);

impl Edge {
    pub(crate) fn identity(&self, to_is_sink: bool) -> EdgeIdentity {
        let target = to_is_sink.then(|| self.target.clone());
        (self.from, self.trigger, self.to, target)
    }
}
