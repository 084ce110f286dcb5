//! Flow Synthesizer
//!
//! This module handles:
//! - Choosing entry nodes (entry URLs, annotated entries, login pages)
//! - Enumerating flows over a graph snapshot
//! - Turning each flow into test requirements
//! - Phrasing requirement stories through the [`StoryPhraser`] collaborator
//!
//! A malformed flow is skipped with a [`SynthesisWarning`]; it never fails the
//! whole synthesis.

mod flows;
mod phrasing;
mod requirements;

pub use flows::{enumerate_flows, Enumeration, Flow, FlowStep, Termination, TriggerPattern};
pub use phrasing::{
    template_story, FieldSummary, FlowSummary, PhraseError, StoryPhraser, TemplatePhraser,
};
pub use requirements::{
    plan_requirements, validate_flow, RequirementKind, RequirementPlan, TestRequirement,
};

use crate::graph::{GraphSnapshot, NodeId};
use crate::page::FormPurpose;
use crate::url::UrlKey;
use serde::Serialize;
use std::sync::Arc;

/// A flow that was skipped or a limit that was hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisWarning {
    pub flow_id: Option<String>,
    pub message: String,
}

/// Everything the synthesizer produced
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutput {
    /// Flows that produced requirements
    pub flows: Vec<Flow>,
    pub requirements: Vec<TestRequirement>,
    pub warnings: Vec<SynthesisWarning>,
    pub flow_cap_hit: bool,
}

/// Walks a graph snapshot into flows and test requirements
pub struct Synthesizer {
    phraser: Arc<dyn StoryPhraser>,
    max_flow_length: usize,
    max_flows: usize,
}

impl Synthesizer {
    pub fn new(phraser: Arc<dyn StoryPhraser>, max_flow_length: usize, max_flows: usize) -> Self {
        Self {
            phraser,
            max_flow_length,
            max_flows,
        }
    }

    /// Entry nodes for enumeration, in priority order
    ///
    /// The crawl's entry URLs come first, then pages annotated as entries,
    /// then pages carrying an authentication form.
    pub fn entry_nodes(&self, snapshot: &GraphSnapshot, entry_keys: &[UrlKey]) -> Vec<NodeId> {
        let mut entries: Vec<NodeId> = Vec::new();
        let mut push = |id: NodeId| {
            if !entries.contains(&id) {
                entries.push(id);
            }
        };

        for key in entry_keys {
            if let Some(id) = snapshot.lookup(key) {
                push(id);
            }
        }
        for node in snapshot.pages().filter(|node| node.is_annotated_entry()) {
            push(node.id);
        }
        for node in snapshot.pages() {
            if node
                .forms
                .iter()
                .any(|form| form.purpose == FormPurpose::Authentication)
            {
                push(node.id);
            }
        }

        entries
    }

    /// Synthesizes flows and requirements from a frozen graph
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Graph to walk
    /// * `entry_keys` - The crawl's entry URLs
    pub async fn synthesize(&self, snapshot: &GraphSnapshot, entry_keys: &[UrlKey]) -> SynthesisOutput {
        let entries = self.entry_nodes(snapshot, entry_keys);
        let enumeration = enumerate_flows(snapshot, &entries, self.max_flow_length, self.max_flows);

        let mut output = SynthesisOutput {
            flow_cap_hit: enumeration.cap_hit,
            ..SynthesisOutput::default()
        };

        if enumeration.cap_hit {
            tracing::warn!(
                "Flow enumeration stopped at the cap of {} flows",
                self.max_flows
            );
            output.warnings.push(SynthesisWarning {
                flow_id: None,
                message: format!(
                    "flow enumeration stopped at {} flows; raise max-flows for full coverage",
                    self.max_flows
                ),
            });
        }

        for flow in enumeration.flows {
            if let Err(reason) = validate_flow(&flow, snapshot, self.max_flow_length) {
                tracing::warn!("Skipping malformed flow {}: {}", flow.id, reason);
                output.warnings.push(SynthesisWarning {
                    flow_id: Some(flow.id.clone()),
                    message: reason,
                });
                continue;
            }

            let plans = plan_requirements(&flow, snapshot);
            for (index, plan) in plans.into_iter().enumerate() {
                let requirement = self.phrase(&flow, index, plan, &mut output.warnings).await;
                output.requirements.push(requirement);
            }
            output.flows.push(flow);
        }

        tracing::info!(
            "Synthesized {} flows and {} test requirements from {} entry nodes",
            output.flows.len(),
            output.requirements.len(),
            entries.len()
        );

        output
    }

    async fn phrase(
        &self,
        flow: &Flow,
        index: usize,
        plan: RequirementPlan,
        warnings: &mut Vec<SynthesisWarning>,
    ) -> TestRequirement {
        let id = format!("{}-R{:02}", flow.id, index + 1);

        let story = match self.phraser.phrase_story(&plan.summary).await {
            Ok(story) if !story.trim().is_empty() => story.trim().to_string(),
            Ok(_) => {
                warnings.push(SynthesisWarning {
                    flow_id: Some(flow.id.clone()),
                    message: format!("{}: {}; used template story", id, PhraseError::Empty),
                });
                template_story(&plan.summary)
            }
            Err(e) => {
                tracing::warn!("Phrasing {} failed: {}", id, e);
                warnings.push(SynthesisWarning {
                    flow_id: Some(flow.id.clone()),
                    message: format!("{}: {}; used template story", id, e),
                });
                template_story(&plan.summary)
            }
        };

        TestRequirement {
            id,
            flow_id: flow.id.clone(),
            kind: plan.kind,
            title: plan.title,
            story,
            assertions: plan.assertions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowGraph;
    use crate::page::{FieldKind, FormDescriptor, FormField, FormMethod, NormalizedPage, PageStatus, TextFormat};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    fn key(path: &str) -> UrlKey {
        UrlKey::parse(&format!("https://example.com{}", path)).unwrap()
    }

    fn page(path: &str, links: &[&str]) -> NormalizedPage {
        NormalizedPage {
            key: key(path),
            requested: key(path),
            aliases: vec![],
            title: None,
            links: links.iter().map(|l| key(l)).collect(),
            forms: vec![],
            fingerprint: String::new(),
            content_type: None,
            status_code: 200,
            page_status: PageStatus::Ok,
            error: None,
        }
    }

    fn login_form() -> FormDescriptor {
        FormDescriptor::new(
            Some("login".into()),
            key("/account"),
            FormMethod::Post,
            vec![
                FormField {
                    name: "user".into(),
                    kind: FieldKind::Text {
                        format: TextFormat::Plain,
                    },
                    required: true,
                    label: None,
                    locator: None,
                },
                FormField {
                    name: "pass".into(),
                    kind: FieldKind::Text {
                        format: TextFormat::Password,
                    },
                    required: true,
                    label: None,
                    locator: None,
                },
            ],
        )
    }

    /// Records every summary it is given and fails on request
    struct RecordingPhraser {
        seen: Mutex<Vec<FlowSummary>>,
        fail: bool,
    }

    #[async_trait]
    impl StoryPhraser for RecordingPhraser {
        async fn phrase_story(&self, summary: &FlowSummary) -> Result<String, PhraseError> {
            self.seen.lock().push(summary.clone());
            if self.fail {
                Err(PhraseError::Unavailable("offline".into()))
            } else {
                Ok(format!("story for {}", summary.flow_id))
            }
        }
    }

    fn login_site() -> GraphSnapshot {
        let mut graph = FlowGraph::new(HashMap::new());
        graph.record_page(&page("/", &["/faq"]), 0).unwrap();
        graph.record_page(&page("/faq", &[]), 1).unwrap();
        // Reachable only from outside the crawl's entry
        let mut login = page("/login", &[]);
        login.forms = vec![login_form()];
        graph.record_page(&login, 1).unwrap();
        graph.record_page(&page("/account", &[]), 2).unwrap();
        graph.snapshot()
    }

    #[tokio::test]
    async fn test_login_page_is_implicit_entry() {
        let snapshot = login_site();
        let synthesizer = Synthesizer::new(Arc::new(TemplatePhraser), 8, 100);

        let entries = synthesizer.entry_nodes(&snapshot, &[key("/")]);
        assert_eq!(entries.len(), 2);

        let output = synthesizer.synthesize(&snapshot, &[key("/")]).await;
        assert_eq!(output.flows.len(), 2);
        assert_eq!(output.flows[1].entry, key("/login"));
        assert_eq!(output.flows[1].pattern, TriggerPattern::FormDriven);

        // 2 for the navigation flow, 1 + 2 for the login flow
        assert_eq!(output.requirements.len(), 5);
        assert_eq!(output.requirements[2].id, "FLOW-002-R01");
        assert!(output.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_phraser_called_once_per_requirement() {
        let snapshot = login_site();
        let phraser = Arc::new(RecordingPhraser {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let synthesizer = Synthesizer::new(phraser.clone(), 8, 100);
        let output = synthesizer.synthesize(&snapshot, &[key("/")]).await;

        assert_eq!(phraser.seen.lock().len(), output.requirements.len());
        assert_eq!(output.requirements[0].story, "story for FLOW-001");
    }

    #[tokio::test]
    async fn test_phraser_failure_falls_back_to_template() {
        let snapshot = login_site();
        let phraser = Arc::new(RecordingPhraser {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let synthesizer = Synthesizer::new(phraser, 8, 100);
        let output = synthesizer.synthesize(&snapshot, &[key("/")]).await;

        assert_eq!(output.requirements.len(), 5);
        assert_eq!(output.warnings.len(), 5);
        assert!(output.requirements[0].story.starts_with("As a visitor"));
    }

    #[tokio::test]
    async fn test_flow_cap_warning() {
        let snapshot = login_site();
        let synthesizer = Synthesizer::new(Arc::new(TemplatePhraser), 8, 1);
        let output = synthesizer.synthesize(&snapshot, &[key("/")]).await;

        assert!(output.flow_cap_hit);
        assert_eq!(output.flows.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].flow_id, None);
    }
}
