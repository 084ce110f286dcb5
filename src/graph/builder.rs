use crate::graph::model::{Annotation, Edge, EdgeIdentity, NodeId, NodeKind, PageNode, Trigger};
use crate::graph::snapshot::GraphSnapshot;
use crate::graph::GraphError;
use crate::page::NormalizedPage;
use crate::url::UrlKey;
use std::collections::{HashMap, HashSet};

/// Result of offering an edge to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    /// Materialized against an existing node
    Added,
    /// Already present; nothing changed
    Duplicate,
    /// Target not discovered yet; held until it is
    Pending,
}

/// An edge waiting for its target node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PendingEdge {
    from: NodeId,
    trigger: Trigger,
    order: u32,
}

/// Incrementally assembled graph of page states and transitions
///
/// Nodes live in an arena; edges reference arena indices. Edges to keys
/// without a node are parked as pending and materialized when the node (or
/// an alias of it) appears, when the key is reported failed, or at `seal`.
#[derive(Debug)]
pub struct FlowGraph {
    nodes: Vec<PageNode>,
    index: HashMap<UrlKey, NodeId>,
    aliases: HashMap<UrlKey, NodeId>,
    edges: Vec<Edge>,
    edge_set: HashSet<EdgeIdentity>,
    pending: HashMap<UrlKey, Vec<PendingEdge>>,
    failed_keys: HashSet<UrlKey>,
    bounded_keys: HashSet<UrlKey>,
    out_of_scope: HashSet<UrlKey>,
    annotations: HashMap<UrlKey, Annotation>,
    sealed_pending: usize,
}

pub const EXTERNAL_SINK: NodeId = NodeId(0);
pub const FAILED_SINK: NodeId = NodeId(1);
pub const UNVISITED_SINK: NodeId = NodeId(2);

impl FlowGraph {
    /// Creates a graph holding only the external, failed and unvisited sinks
    ///
    /// # Arguments
    ///
    /// * `annotations` - Entry/goal roles attached to pages as they are created
    pub fn new(annotations: HashMap<UrlKey, Annotation>) -> Self {
        let nodes = vec![
            PageNode::sink(EXTERNAL_SINK, NodeKind::External),
            PageNode::sink(FAILED_SINK, NodeKind::Failed),
            PageNode::sink(UNVISITED_SINK, NodeKind::Unvisited),
        ];
        Self {
            nodes,
            index: HashMap::new(),
            aliases: HashMap::new(),
            edges: Vec::new(),
            edge_set: HashSet::new(),
            pending: HashMap::new(),
            failed_keys: HashSet::new(),
            bounded_keys: HashSet::new(),
            out_of_scope: HashSet::new(),
            annotations,
            sealed_pending: 0,
        }
    }

    /// Resolves a key (or an alias of one) to its node
    pub fn lookup(&self, key: &UrlKey) -> Option<NodeId> {
        self.index
            .get(key)
            .or_else(|| self.aliases.get(key))
            .copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&PageNode> {
        self.nodes.get(id.index())
    }

    /// Number of page nodes (sinks excluded)
    pub fn page_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Inserts a page node or records a revisit of an existing one
    ///
    /// A revisit bumps the revisit counter and replaces the fingerprint; the
    /// node is never duplicated and its edges are left as they are.
    ///
    /// # Returns
    ///
    /// * `(id, true)` - A new node was created
    /// * `(id, false)` - The key (or an alias of it) already had a node
    pub fn add_page(&mut self, mut node: PageNode) -> Result<(NodeId, bool), GraphError> {
        if let Some(id) = self.lookup(&node.key) {
            let existing = &mut self.nodes[id.index()];
            existing.revisits += 1;
            if node.fingerprint.is_some() {
                existing.fingerprint = node.fingerprint.take();
            }
            tracing::debug!("Revisit of {} (count {})", existing.key, existing.revisits);
            return Ok((id, false));
        }

        let id = NodeId(self.nodes.len());
        node.id = id;
        node.kind = NodeKind::Page;
        if node.annotation.is_none() {
            node.annotation = self.annotations.get(&node.key).cloned();
        }
        let key = node.key.clone();
        if self.index.insert(key.clone(), id).is_some() {
            return Err(GraphError::DuplicateNode(key));
        }
        self.nodes.push(node);
        self.resolve_pending(&key, id);

        Ok((id, true))
    }

    /// Records a normalized page with its aliases and outbound edges
    ///
    /// Only the first observation of a page contributes edges.
    pub fn record_page(&mut self, page: &NormalizedPage, depth: u32) -> Result<NodeId, GraphError> {
        let annotation = std::iter::once(&page.key)
            .chain(page.aliases.iter())
            .find_map(|key| self.annotations.get(key).cloned());

        let node = PageNode {
            id: NodeId(0),
            key: page.key.clone(),
            kind: NodeKind::Page,
            title: page.title.clone(),
            fingerprint: Some(page.fingerprint.clone()),
            outbound: page.links.clone(),
            forms: page.forms.clone(),
            depth,
            status: Some(page.page_status),
            status_code: Some(page.status_code),
            content_type: page.content_type.clone(),
            revisits: 0,
            annotation,
            error: page.error.clone(),
        };

        let (id, created) = self.add_page(node)?;
        for alias in &page.aliases {
            self.add_alias(alias, id)?;
        }
        if !created {
            return Ok(id);
        }

        let mut order = 0u32;
        for link in &page.links {
            self.add_edge(id, Trigger::Link, link, order)?;
            order += 1;
        }
        for (index, form) in page.forms.iter().enumerate() {
            self.add_edge(id, Trigger::FormSubmit { form: index }, &form.action, order)?;
            order += 1;
        }

        Ok(id)
    }

    /// Makes `alias` another name of node `id`
    ///
    /// Returns false if the alias already names a node; the existing mapping wins.
    pub fn add_alias(&mut self, alias: &UrlKey, id: NodeId) -> Result<bool, GraphError> {
        if id.index() >= self.nodes.len() || self.nodes[id.index()].is_sink() {
            return Err(GraphError::UnknownSource(id));
        }
        if self.lookup(alias).is_some() {
            return Ok(false);
        }
        self.aliases.insert(alias.clone(), id);
        self.resolve_pending(alias, id);
        Ok(true)
    }

    /// Adds an edge from an existing node to the node of `target`
    ///
    /// Idempotent: the same (source, trigger, target) is stored once.
    ///
    /// # Arguments
    ///
    /// * `from` - Source node; must be a page node
    /// * `trigger` - Link click or form submission
    /// * `target` - Key of the destination page
    /// * `order` - Position of the trigger on the source page
    pub fn add_edge(
        &mut self,
        from: NodeId,
        trigger: Trigger,
        target: &UrlKey,
        order: u32,
    ) -> Result<EdgeStatus, GraphError> {
        match self.nodes.get(from.index()) {
            Some(node) if !node.is_sink() => {}
            _ => return Err(GraphError::UnknownSource(from)),
        }

        if let Some(to) = self.lookup(target) {
            return Ok(self.insert_edge(from, to, trigger, target, order));
        }
        if self.failed_keys.contains(target) {
            return Ok(self.insert_edge(from, FAILED_SINK, trigger, target, order));
        }
        if self.out_of_scope.contains(target) {
            return Ok(self.insert_edge(from, EXTERNAL_SINK, trigger, target, order));
        }

        let waiting = self.pending.entry(target.clone()).or_default();
        let edge = PendingEdge { from, trigger, order };
        if waiting.contains(&edge) {
            return Ok(EdgeStatus::Duplicate);
        }
        waiting.push(edge);
        Ok(EdgeStatus::Pending)
    }

    /// Records that `key` will never get a node because its fetch failed
    ///
    /// Pending and future edges to it point at the failed sink.
    pub fn mark_failed(&mut self, key: &UrlKey) {
        if self.lookup(key).is_some() {
            return;
        }
        self.failed_keys.insert(key.clone());
        if let Some(waiting) = self.pending.remove(key) {
            for edge in waiting {
                self.insert_edge(edge.from, FAILED_SINK, edge.trigger, key, edge.order);
            }
        }
    }

    /// Records that `key` was admitted but left unfetched by a crawl bound
    ///
    /// Edges still pending on it at `seal` go to the unvisited sink.
    pub fn mark_bounded(&mut self, key: &UrlKey) {
        if self.lookup(key).is_none() {
            self.bounded_keys.insert(key.clone());
        }
    }

    /// Records that `key` resolved to a location outside the crawl scope
    ///
    /// Used when a redirect leaves the scope: the entry's key will never get
    /// a node, so pending and future edges to it point at the external sink.
    pub fn mark_out_of_scope(&mut self, key: &UrlKey) {
        if self.lookup(key).is_some() {
            return;
        }
        self.bounded_keys.remove(key);
        self.out_of_scope.insert(key.clone());
        if let Some(waiting) = self.pending.remove(key) {
            for edge in waiting {
                self.insert_edge(edge.from, EXTERNAL_SINK, edge.trigger, key, edge.order);
            }
        }
    }

    /// Materializes every unresolved edge against a sink
    ///
    /// Keys marked bounded go to the unvisited sink, everything else to the
    /// external sink. Called once crawling has stopped; returns the number of
    /// edges sealed.
    pub fn seal(&mut self) -> usize {
        let mut keys: Vec<UrlKey> = self.pending.keys().cloned().collect();
        keys.sort();

        let mut sealed = 0;
        let mut unvisited = 0;
        for key in keys {
            let sink = if self.bounded_keys.contains(&key) {
                UNVISITED_SINK
            } else {
                EXTERNAL_SINK
            };
            if let Some(waiting) = self.pending.remove(&key) {
                for edge in waiting {
                    self.insert_edge(edge.from, sink, edge.trigger, &key, edge.order);
                    sealed += 1;
                    if sink == UNVISITED_SINK {
                        unvisited += 1;
                    }
                }
            }
        }
        self.sealed_pending += sealed;
        if sealed > 0 {
            tracing::debug!(
                "Sealed {} pending edges ({} into the unvisited sink)",
                sealed,
                unvisited
            );
        }
        sealed
    }

    /// Frozen copy for the synthesizer and the reports
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut keys: HashMap<UrlKey, NodeId> = self.aliases.clone();
        keys.extend(self.index.iter().map(|(key, id)| (key.clone(), *id)));

        GraphSnapshot::new(
            self.nodes.clone(),
            self.edges.clone(),
            keys,
            self.aliases.len(),
            self.pending_count(),
            self.sealed_pending,
        )
    }

    fn resolve_pending(&mut self, key: &UrlKey, to: NodeId) {
        if let Some(waiting) = self.pending.remove(key) {
            for edge in waiting {
                self.insert_edge(edge.from, to, edge.trigger, key, edge.order);
            }
        }
    }

    fn insert_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        trigger: Trigger,
        target: &UrlKey,
        order: u32,
    ) -> EdgeStatus {
        let edge = Edge {
            from,
            to,
            trigger,
            target: target.clone(),
            order,
        };
        let to_is_sink = self.nodes.get(to.index()).map(PageNode::is_sink).unwrap_or(true);
        if !self.edge_set.insert(edge.identity(to_is_sink)) {
            return EdgeStatus::Duplicate;
        }
        self.edges.push(edge);
        EdgeStatus::Added
    }
}
