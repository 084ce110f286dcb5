//! Flow enumeration
//!
//! Depth-first walk from each entry node. A path closes into a flow when it
//! reaches a sink, a goal page or a dead end, when it hits the length cap, or
//! when an edge leads back onto the current path (cycle closure). The cap and
//! the cycle rule together bound every path, so enumeration terminates on any
//! graph.

use crate::graph::{Edge, GraphSnapshot, NodeId, NodeKind, Trigger};
use crate::url::UrlKey;
use serde::Serialize;

/// Dominant trigger pattern of a flow
///
/// Any form submission makes a flow form-driven. `Mixed` narrows that to
/// flows that go on following links after a submission, where the form is a
/// waypoint rather than the destination. Both get the form requirement rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPattern {
    /// Only link edges
    Navigation,
    /// At least one form submission, and no link click after one
    FormDriven,
    /// A link click follows a form submission
    Mixed,
}

impl TriggerPattern {
    /// Classifies a flow from its triggers in path order
    pub fn classify<I>(triggers: I) -> Self
    where
        I: IntoIterator<Item = Trigger>,
    {
        let mut submitted = false;
        for trigger in triggers {
            match trigger {
                Trigger::FormSubmit { .. } => submitted = true,
                Trigger::Link if submitted => return TriggerPattern::Mixed,
                Trigger::Link => {}
            }
        }
        if submitted {
            TriggerPattern::FormDriven
        } else {
            TriggerPattern::Navigation
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPattern::Navigation => "navigation",
            TriggerPattern::FormDriven => "form-driven",
            TriggerPattern::Mixed => "mixed",
        }
    }
}

/// Why a flow ended where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Page with no outbound edges
    Terminal,
    /// Page annotated as a goal
    Goal,
    /// Target is outside the crawl scope
    External,
    /// Target could not be fetched
    Failed,
    /// Target was in scope but left unfetched by a crawl bound
    Unvisited,
    /// Last edge leads back to a page already on the path
    Cycle,
    /// Maximum flow length reached
    LengthCap,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Terminal => "dead end",
            Termination::Goal => "goal",
            Termination::External => "external",
            Termination::Failed => "failed",
            Termination::Unvisited => "not visited due to crawl bound",
            Termination::Cycle => "cycle",
            Termination::LengthCap => "length cap",
        }
    }
}

/// One transition of a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStep {
    pub from: UrlKey,
    /// Destination page, or the uncrawled URL for sink steps
    pub to: UrlKey,
    pub to_kind: NodeKind,
    pub trigger: Trigger,
    #[serde(skip)]
    pub from_id: NodeId,
    #[serde(skip)]
    pub to_id: NodeId,
}

/// A path through the graph from an entry node
#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    /// `FLOW-001`, numbered in enumeration order
    pub id: String,
    pub entry: UrlKey,
    pub steps: Vec<FlowStep>,
    pub pattern: TriggerPattern,
    pub cyclic: bool,
    pub termination: Termination,
}

impl Flow {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn form_steps(&self) -> impl Iterator<Item = &FlowStep> {
        self.steps.iter().filter(|step| step.trigger.is_form())
    }

    /// Node the flow ends on
    pub fn last_node(&self) -> Option<NodeId> {
        self.steps.last().map(|step| step.to_id)
    }
}

/// Flows found by one enumeration
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub flows: Vec<Flow>,
    /// True if enumeration stopped at the flow cap
    pub cap_hit: bool,
}

/// Enumerates flows from `entries`
///
/// # Arguments
///
/// * `snapshot` - Frozen graph
/// * `entries` - Entry nodes, in priority order; duplicates are ignored
/// * `max_length` - Edge cap per flow; a cycle-closing edge may add one more
/// * `max_flows` - Enumeration stops once this many flows exist
pub fn enumerate_flows(
    snapshot: &GraphSnapshot,
    entries: &[NodeId],
    max_length: usize,
    max_flows: usize,
) -> Enumeration {
    let mut walker = Walker {
        snapshot,
        max_length,
        max_flows,
        on_path: vec![false; snapshot.nodes().len()],
        path: Vec::new(),
        entry: None,
        result: Enumeration::default(),
    };

    let mut started: Vec<NodeId> = Vec::new();
    for &entry in entries {
        if started.contains(&entry) {
            continue;
        }
        let Some(node) = snapshot.node(entry) else {
            continue;
        };
        if node.kind != NodeKind::Page {
            continue;
        }
        started.push(entry);

        walker.entry = Some(node.key.clone());
        walker.on_path[entry.index()] = true;
        walker.visit(entry);
        walker.on_path[entry.index()] = false;

        if walker.result.cap_hit {
            break;
        }
    }

    walker.result
}

struct Walker<'a> {
    snapshot: &'a GraphSnapshot,
    max_length: usize,
    max_flows: usize,
    on_path: Vec<bool>,
    path: Vec<Edge>,
    entry: Option<UrlKey>,
    result: Enumeration,
}

impl Walker<'_> {
    fn visit(&mut self, node_id: NodeId) {
        if self.full() {
            return;
        }
        let Some(node) = self.snapshot.node(node_id) else {
            return;
        };

        if !self.path.is_empty() {
            let closing = match node.kind {
                NodeKind::External => Some(Termination::External),
                NodeKind::Failed => Some(Termination::Failed),
                NodeKind::Unvisited => Some(Termination::Unvisited),
                NodeKind::Page if node.is_goal() => Some(Termination::Goal),
                NodeKind::Page if self.snapshot.out_degree(node_id) == 0 => {
                    Some(Termination::Terminal)
                }
                NodeKind::Page => None,
            };
            if let Some(termination) = closing {
                self.emit(termination);
                return;
            }
        }

        let at_cap = self.path.len() >= self.max_length;
        let mut truncated = false;
        let outgoing: Vec<Edge> = self.snapshot.outgoing(node_id).cloned().collect();

        for edge in outgoing {
            if self.full() {
                return;
            }
            let target = edge.to.index();
            let next = edge.to;
            if self.on_path.get(target).copied().unwrap_or(false) {
                self.path.push(edge);
                self.emit(Termination::Cycle);
                self.path.pop();
                continue;
            }
            if at_cap {
                truncated = true;
                continue;
            }

            self.path.push(edge);
            self.on_path[target] = true;
            self.visit(next);
            self.on_path[target] = false;
            self.path.pop();
        }

        if truncated && !self.full() {
            self.emit(Termination::LengthCap);
        }
    }

    fn full(&mut self) -> bool {
        if self.result.flows.len() >= self.max_flows {
            self.result.cap_hit = true;
            return true;
        }
        false
    }

    fn emit(&mut self, termination: Termination) {
        if self.full() {
            return;
        }
        let Some(entry) = self.entry.clone() else {
            return;
        };

        let mut steps = Vec::with_capacity(self.path.len());
        for edge in &self.path {
            let (Some(from), Some(to)) = (self.snapshot.node(edge.from), self.snapshot.node(edge.to))
            else {
                continue;
            };
            // Sink steps keep the URL the trigger pointed at
            let to_key = if to.is_sink() {
                edge.target.clone()
            } else {
                to.key.clone()
            };
            steps.push(FlowStep {
                from: from.key.clone(),
                to: to_key,
                to_kind: to.kind,
                trigger: edge.trigger,
                from_id: edge.from,
                to_id: edge.to,
            });
        }

        let id = format!("FLOW-{:03}", self.result.flows.len() + 1);
        self.result.flows.push(Flow {
            id,
            entry,
            steps,
            pattern: TriggerPattern::classify(self.path.iter().map(|edge| edge.trigger)),
            cyclic: termination == Termination::Cycle,
            termination,
        });
    }
}
