//! Story phrasing
//!
//! Requirement prose comes from a language-generation collaborator behind the
//! [`StoryPhraser`] trait. It only ever sees a [`FlowSummary`]: a bounded,
//! flattened description of one flow, never graph internals.

use crate::synth::flows::TriggerPattern;
use crate::synth::requirements::RequirementKind;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Longest string handed to a phraser
pub const MAX_SUMMARY_TEXT: usize = 120;

/// Most pages listed in a summary
pub const MAX_SUMMARY_PAGES: usize = 12;

/// Most form fields listed in a summary
pub const MAX_SUMMARY_FIELDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhraseError {
    #[error("phrasing backend unavailable: {0}")]
    Unavailable(String),

    #[error("phrasing backend returned no text")]
    Empty,
}

/// A form field as a phraser sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub label: String,
    pub kind: String,
    pub required: bool,
}

/// Bounded description of one requirement's flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSummary {
    pub flow_id: String,
    pub requirement: RequirementKind,
    pub pattern: TriggerPattern,
    /// Page labels along the flow, entry first
    pub pages: Vec<String>,
    /// Label of the last page or sink
    pub destination: String,
    /// Form being exercised, if any
    pub form: Option<String>,
    pub fields: Vec<FieldSummary>,
    /// Field left empty by a negative case
    pub focus_field: Option<String>,
    /// Role annotated on the destination
    pub destination_role: Option<String>,
}

impl FlowSummary {
    /// Enforces the size bounds on every list and string
    pub fn bounded(mut self) -> Self {
        self.flow_id = clip(&self.flow_id);
        self.pages.truncate(MAX_SUMMARY_PAGES);
        self.pages = self.pages.iter().map(|page| clip(page)).collect();
        self.destination = clip(&self.destination);
        self.form = self.form.as_deref().map(clip);
        self.fields.truncate(MAX_SUMMARY_FIELDS);
        for field in &mut self.fields {
            field.label = clip(&field.label);
        }
        self.focus_field = self.focus_field.as_deref().map(clip);
        self.destination_role = self.destination_role.as_deref().map(clip);
        self
    }
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_TEXT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_SUMMARY_TEXT - 1).collect();
    clipped.push('…');
    clipped
}

/// Language-generation collaborator
#[async_trait]
pub trait StoryPhraser: Send + Sync {
    /// Phrases a user story for one test requirement
    async fn phrase_story(&self, summary: &FlowSummary) -> Result<String, PhraseError>;
}

/// Deterministic phraser built from fixed sentence templates
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePhraser;

#[async_trait]
impl StoryPhraser for TemplatePhraser {
    async fn phrase_story(&self, summary: &FlowSummary) -> Result<String, PhraseError> {
        Ok(template_story(summary))
    }
}

/// Story text used by [`TemplatePhraser`] and as the fallback when a phraser fails
pub fn template_story(summary: &FlowSummary) -> String {
    let start = summary
        .pages
        .first()
        .cloned()
        .unwrap_or_else(|| "the site".to_string());
    let form = summary.form.as_deref().unwrap_or("the form");

    match &summary.requirement {
        RequirementKind::Reachability => format!(
            "As a visitor starting on {}, I want to navigate to {} so that I can reach the content I need.",
            start, summary.destination
        ),
        RequirementKind::HappyPath => format!(
            "As a visitor starting on {}, I want to complete {} with valid details so that my submission reaches {}.",
            start, form, summary.destination
        ),
        RequirementKind::MissingField { .. } => format!(
            "As a visitor filling in {}, I want to be told when {} is missing so that I can correct it before submitting.",
            form,
            summary.focus_field.as_deref().unwrap_or("a required field")
        ),
        RequirementKind::TerminalRole => match &summary.destination_role {
            Some(role) => format!(
                "As a visitor starting on {}, I want to arrive at the {} so that I know my journey is complete.",
                start, role
            ),
            None => format!(
                "As a visitor starting on {}, I want {} to behave as the end of this journey.",
                start, summary.destination
            ),
        },
        RequirementKind::LoopClosure => format!(
            "As a visitor, I want to return to {} after browsing so that I can continue from where I started.",
            summary.destination
        ),
    }
}
