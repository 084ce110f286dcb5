use crate::graph::model::{Edge, NodeId, NodeKind, PageNode};
use crate::graph::GraphError;
use crate::page::PageStatus;
use crate::url::UrlKey;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Summary counts of a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub pages: usize,
    pub ok_pages: usize,
    pub error_pages: usize,
    pub skipped_pages: usize,
    pub edges: usize,
    pub link_edges: usize,
    pub form_edges: usize,
    /// Edges into the external sink
    pub external_edges: usize,
    /// Edges into the failed sink
    pub failed_edges: usize,
    /// Edges into the unvisited sink
    pub unvisited_edges: usize,
    /// Pending edges materialized into a sink at seal time
    pub sealed_edges: usize,
    /// Pending edges still unresolved when the snapshot was taken
    pub pending_edges: usize,
    pub aliases: usize,
    pub revisits: u64,
}

/// Immutable view of the flow graph
///
/// Taken under the graph lock; readers never observe a graph mid-mutation.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    nodes: Vec<PageNode>,
    edges: Vec<Edge>,
    keys: HashMap<UrlKey, NodeId>,
    /// Edge indices per node, in trigger order
    adjacency: Vec<Vec<usize>>,
    alias_count: usize,
    pending_count: usize,
    sealed_count: usize,
}

impl GraphSnapshot {
    pub(crate) fn new(
        nodes: Vec<PageNode>,
        edges: Vec<Edge>,
        keys: HashMap<UrlKey, NodeId>,
        alias_count: usize,
        pending_count: usize,
        sealed_count: usize,
    ) -> Self {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (index, edge) in edges.iter().enumerate() {
            if let Some(out) = adjacency.get_mut(edge.from.index()) {
                out.push(index);
            }
        }
        for out in &mut adjacency {
            out.sort_by_key(|&index| (edges[index].order, index));
        }

        Self {
            nodes,
            edges,
            keys,
            adjacency,
            alias_count,
            pending_count,
            sealed_count,
        }
    }

    pub fn nodes(&self) -> &[PageNode] {
        &self.nodes
    }

    /// Page nodes only, in creation order
    pub fn pages(&self) -> impl Iterator<Item = &PageNode> {
        self.nodes.iter().filter(|node| node.kind == NodeKind::Page)
    }

    pub fn node(&self, id: NodeId) -> Option<&PageNode> {
        self.nodes.get(id.index())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `id`, ordered as the triggers appear on the page
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency
            .get(id.index())
            .into_iter()
            .flatten()
            .map(move |&index| &self.edges[index])
    }

    pub fn out_degree(&self, id: NodeId) -> usize {
        self.adjacency.get(id.index()).map(Vec::len).unwrap_or(0)
    }

    /// Resolves a key or alias to its node
    pub fn lookup(&self, key: &UrlKey) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    /// Resolves a key or alias to its node
    pub fn resolve(&self, key: &UrlKey) -> Option<&PageNode> {
        self.lookup(key).and_then(|id| self.node(id))
    }

    /// Verifies the structural invariants of the graph
    ///
    /// A violation means the builder has a bug.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        let mut seen: HashSet<&UrlKey> = HashSet::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id.index() != index {
                return Err(GraphError::DanglingEdge(node.id));
            }
            if node.kind == NodeKind::Page && !seen.insert(&node.key) {
                return Err(GraphError::DuplicateNode(node.key.clone()));
            }
        }

        for edge in &self.edges {
            let from = self
                .node(edge.from)
                .ok_or(GraphError::DanglingEdge(edge.from))?;
            if from.is_sink() {
                return Err(GraphError::UnknownSource(edge.from));
            }
            if self.node(edge.to).is_none() {
                return Err(GraphError::DanglingEdge(edge.to));
            }
        }

        Ok(())
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            edges: self.edges.len(),
            sealed_edges: self.sealed_count,
            pending_edges: self.pending_count,
            aliases: self.alias_count,
            ..GraphStats::default()
        };

        for node in self.pages() {
            stats.pages += 1;
            stats.revisits += u64::from(node.revisits);
            match node.status {
                Some(PageStatus::Ok) => stats.ok_pages += 1,
                Some(PageStatus::Error) => stats.error_pages += 1,
                Some(PageStatus::Skipped) => stats.skipped_pages += 1,
                None => {}
            }
        }

        for edge in &self.edges {
            if edge.trigger.is_form() {
                stats.form_edges += 1;
            } else {
                stats.link_edges += 1;
            }
            match self.node(edge.to).map(|node| node.kind) {
                Some(NodeKind::External) => stats.external_edges += 1,
                Some(NodeKind::Failed) => stats.failed_edges += 1,
                Some(NodeKind::Unvisited) => stats.unvisited_edges += 1,
                _ => {}
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::Trigger;
    use crate::graph::{EXTERNAL_SINK, FAILED_SINK};

    fn node(id: usize, path: &str) -> PageNode {
        let mut node = PageNode::sink(NodeId(id), NodeKind::Page);
        node.key = UrlKey::parse(&format!("https://example.com{}", path)).unwrap();
        node.status = Some(PageStatus::Ok);
        node
    }

    fn sinks() -> Vec<PageNode> {
        vec![
            PageNode::sink(EXTERNAL_SINK, NodeKind::External),
            PageNode::sink(FAILED_SINK, NodeKind::Failed),
        ]
    }

    fn edge(from: usize, to: usize, order: u32) -> Edge {
        Edge {
            from: NodeId(from),
            to: NodeId(to),
            trigger: Trigger::Link,
            target: UrlKey::parse(&format!("https://example.com/t{}", to)).unwrap(),
            order,
        }
    }

    #[test]
    fn test_outgoing_sorted_by_order() {
        let mut nodes = sinks();
        nodes.push(node(2, "/a"));
        nodes.push(node(3, "/b"));
        nodes.push(node(4, "/c"));
        let snapshot = GraphSnapshot::new(
            nodes,
            vec![edge(2, 4, 1), edge(2, 3, 0)],
            HashMap::new(),
            0,
            0,
            0,
        );

        let targets: Vec<usize> = snapshot.outgoing(NodeId(2)).map(|e| e.to.index()).collect();
        assert_eq!(targets, vec![3, 4]);
        assert_eq!(snapshot.out_degree(NodeId(3)), 0);
        assert_eq!(snapshot.outgoing(NodeId(99)).count(), 0);
        assert!(snapshot.check_invariants().is_ok());
    }

    #[test]
    fn test_dangling_edge_detected() {
        let mut nodes = sinks();
        nodes.push(node(2, "/a"));
        let snapshot = GraphSnapshot::new(nodes, vec![edge(2, 7, 0)], HashMap::new(), 0, 0, 0);
        assert_eq!(
            snapshot.check_invariants(),
            Err(GraphError::DanglingEdge(NodeId(7)))
        );
    }

    #[test]
    fn test_duplicate_node_detected() {
        let mut nodes = sinks();
        nodes.push(node(2, "/a"));
        nodes.push(node(3, "/a"));
        let snapshot = GraphSnapshot::new(nodes, vec![], HashMap::new(), 0, 0, 0);
        assert!(matches!(
            snapshot.check_invariants(),
            Err(GraphError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_edge_from_sink_detected() {
        let mut nodes = sinks();
        nodes.push(node(2, "/a"));
        let snapshot = GraphSnapshot::new(nodes, vec![edge(0, 2, 0)], HashMap::new(), 0, 0, 0);
        assert_eq!(
            snapshot.check_invariants(),
            Err(GraphError::UnknownSource(EXTERNAL_SINK))
        );
    }
}
