//! Requirement rules
//!
//! Maps one flow to its test requirements:
//!
//! | Pattern | Requirements |
//! |---------|--------------|
//! | navigation | reachability, plus terminal role or loop closure |
//! | form-driven, mixed | one happy path, one missing-field case per required field |
//!
//! Story text is filled in later by the phraser; this module only decides
//! what each requirement checks.

use crate::graph::{GraphSnapshot, NodeKind, PageNode, Trigger};
use crate::page::{FieldKind, FormDescriptor};
use crate::synth::flows::{Flow, FlowStep, Termination, TriggerPattern};
use crate::synth::phrasing::{FieldSummary, FlowSummary};
use serde::Serialize;

/// What a test requirement verifies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequirementKind {
    /// Every step of the flow can be followed
    Reachability,
    /// Forms on the flow accept valid input
    HappyPath,
    /// A form rejects a submission without one required field
    MissingField { form: String, field: String },
    /// The last page plays its expected role
    TerminalRole,
    /// The closing edge leads back to a page already visited
    LoopClosure,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementKind::Reachability => "reachability",
            RequirementKind::HappyPath => "happy path",
            RequirementKind::MissingField { .. } => "missing field",
            RequirementKind::TerminalRole => "terminal role",
            RequirementKind::LoopClosure => "loop closure",
        }
    }
}

/// A generated test requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRequirement {
    /// `FLOW-003-R02`
    pub id: String,
    pub flow_id: String,
    pub kind: RequirementKind,
    pub title: String,
    pub story: String,
    pub assertions: Vec<String>,
}

/// A requirement before its story is phrased
#[derive(Debug, Clone)]
pub struct RequirementPlan {
    pub kind: RequirementKind,
    pub title: String,
    pub assertions: Vec<String>,
    pub summary: FlowSummary,
}

/// Checks that a flow is a connected path through existing nodes
///
/// # Returns
///
/// * `Ok(())` - The flow can be turned into requirements
/// * `Err(String)` - Why it cannot; recorded as a synthesis warning
pub fn validate_flow(flow: &Flow, snapshot: &GraphSnapshot, max_length: usize) -> Result<(), String> {
    let first = flow.steps.first().ok_or("flow has no steps")?;

    if first.from != flow.entry {
        return Err(format!("first step starts at {}, not at entry {}", first.from, flow.entry));
    }
    if flow.steps.len() > max_length + 1 {
        return Err(format!(
            "flow has {} steps, more than the cap of {} plus a closing edge",
            flow.steps.len(),
            max_length
        ));
    }

    for (index, step) in flow.steps.iter().enumerate() {
        let from = snapshot
            .node(step.from_id)
            .ok_or_else(|| format!("step {} starts at missing node {}", index + 1, step.from_id))?;
        if from.is_sink() {
            return Err(format!("step {} leaves a sink node", index + 1));
        }
        if snapshot.node(step.to_id).is_none() {
            return Err(format!("step {} ends at missing node {}", index + 1, step.to_id));
        }
        if let Trigger::FormSubmit { form } = step.trigger {
            if form >= from.forms.len() {
                return Err(format!("step {} submits unknown form #{} on {}", index + 1, form, from.key));
            }
        }
        if index > 0 && flow.steps[index - 1].to_id != step.from_id {
            return Err(format!("step {} does not continue from step {}", index + 1, index));
        }
    }

    Ok(())
}

/// Plans the requirements of a validated flow
pub fn plan_requirements(flow: &Flow, snapshot: &GraphSnapshot) -> Vec<RequirementPlan> {
    let view = FlowView::new(flow, snapshot);

    match flow.pattern {
        TriggerPattern::Navigation => {
            let mut plans = vec![view.reachability()];
            if flow.cyclic {
                plans.push(view.loop_closure());
            } else if let Some(plan) = view.terminal_role() {
                plans.push(plan);
            }
            plans
        }
        TriggerPattern::FormDriven | TriggerPattern::Mixed => {
            let mut plans = vec![view.happy_path()];
            plans.extend(view.missing_fields());
            plans
        }
    }
}

/// A form submission within a flow
struct FormStep<'a> {
    step: &'a FlowStep,
    page: &'a PageNode,
    form: &'a FormDescriptor,
    name: String,
}

/// Labels and lookups shared by the rules
struct FlowView<'a> {
    flow: &'a Flow,
    snapshot: &'a GraphSnapshot,
}

impl<'a> FlowView<'a> {
    fn new(flow: &'a Flow, snapshot: &'a GraphSnapshot) -> Self {
        Self { flow, snapshot }
    }

    fn entry_label(&self) -> String {
        self.flow
            .steps
            .first()
            .and_then(|step| self.snapshot.node(step.from_id))
            .map(PageNode::label)
            .unwrap_or_else(|| self.flow.entry.display_path())
    }

    fn from_label(&self, step: &FlowStep) -> String {
        self.snapshot
            .node(step.from_id)
            .map(PageNode::label)
            .unwrap_or_else(|| step.from.display_path())
    }

    fn to_label(&self, step: &FlowStep) -> String {
        match step.to_kind {
            NodeKind::Page => self
                .snapshot
                .node(step.to_id)
                .map(PageNode::label)
                .unwrap_or_else(|| step.to.display_path()),
            NodeKind::External | NodeKind::Failed | NodeKind::Unvisited => step.to.to_string(),
        }
    }

    fn destination(&self) -> String {
        self.flow
            .steps
            .last()
            .map(|step| self.to_label(step))
            .unwrap_or_else(|| self.entry_label())
    }

    fn destination_role(&self) -> Option<String> {
        let step = self.flow.steps.last()?;
        let node = self.snapshot.node(step.to_id)?;
        match node.kind {
            NodeKind::Page => node.annotation.as_ref().and_then(|a| a.label.clone()),
            _ => None,
        }
    }

    fn pages(&self) -> Vec<String> {
        let mut pages = vec![self.entry_label()];
        pages.extend(self.flow.steps.iter().map(|step| self.to_label(step)));
        pages
    }

    fn form_steps(&self) -> Vec<FormStep<'a>> {
        let flow: &'a Flow = self.flow;
        let snapshot: &'a GraphSnapshot = self.snapshot;
        let mut forms = Vec::new();
        for step in &flow.steps {
            let Trigger::FormSubmit { form } = step.trigger else {
                continue;
            };
            let Some(page) = snapshot.node(step.from_id) else {
                continue;
            };
            let Some(descriptor) = page.forms.get(form) else {
                continue;
            };
            forms.push(FormStep {
                step,
                page,
                form: descriptor,
                name: descriptor.display_name(form),
            });
        }
        forms
    }

    fn summary(&self, kind: RequirementKind, form: Option<&FormStep<'_>>, focus: Option<String>) -> FlowSummary {
        FlowSummary {
            flow_id: self.flow.id.clone(),
            requirement: kind,
            pattern: self.flow.pattern,
            pages: self.pages(),
            destination: self.destination(),
            form: form.map(|f| f.name.clone()),
            fields: form
                .map(|f| {
                    f.form
                        .visible_fields()
                        .map(|field| FieldSummary {
                            label: field.display_name().to_string(),
                            kind: field.kind.describe().to_string(),
                            required: field.required,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            focus_field: focus,
            destination_role: self.destination_role(),
        }
        .bounded()
    }

    fn describe_step(&self, step: &FlowStep) -> String {
        let from = self.from_label(step);
        let action = match step.trigger {
            Trigger::Link => format!("following the link to {}", step.to.display_path()),
            Trigger::FormSubmit { form } => {
                let name = self
                    .snapshot
                    .node(step.from_id)
                    .and_then(|page| page.forms.get(form))
                    .map(|descriptor| descriptor.display_name(form))
                    .unwrap_or_else(|| format!("form #{}", form + 1));
                format!("submitting {}", name)
            }
        };

        match step.to_kind {
            NodeKind::Page => format!("From {}, {} opens {}", from, action, self.to_label(step)),
            NodeKind::External => format!("From {}, {} leaves the crawled site for {}", from, action, step.to),
            NodeKind::Failed => format!("From {}, {} reaches {}, which failed to load during the crawl", from, action, step.to),
            NodeKind::Unvisited => format!("From {}, {} reaches {}, which was not visited due to crawl bound", from, action, step.to),
        }
    }

    fn reachability(&self) -> RequirementPlan {
        let mut assertions: Vec<String> = vec![format!(
            "{} ({}) loads successfully",
            self.entry_label(),
            self.flow.entry.display_path()
        )];
        assertions.extend(self.flow.steps.iter().map(|step| self.describe_step(step)));

        let kind = RequirementKind::Reachability;
        RequirementPlan {
            title: format!("Reach {} from {}", self.destination(), self.entry_label()),
            assertions,
            summary: self.summary(kind.clone(), None, None),
            kind,
        }
    }

    fn terminal_role(&self) -> Option<RequirementPlan> {
        let last = self.flow.steps.last()?;
        let destination = self.destination();
        let from = self.from_label(last);

        let assertions = match self.flow.termination {
            Termination::Goal => {
                let role = self.destination_role().unwrap_or_else(|| "goal page".to_string());
                vec![
                    format!("{} is shown as the {}", destination, role),
                    format!("{} confirms that the journey is complete", destination),
                ]
            }
            Termination::Terminal => vec![
                format!("{} offers no further navigation", destination),
                format!("Ending the journey on {} is intended behaviour", destination),
            ],
            Termination::Failed => vec![
                format!("The link to {} on {} does not lead to a broken page", last.to, from),
                format!("If {} is unavailable, an error page explains the problem", last.to),
            ],
            Termination::External => vec![
                format!("The link to {} on {} opens the intended external destination", last.to, from),
            ],
            Termination::Unvisited => vec![
                format!("The link to {} on {} opens a page that loads successfully", last.to, from),
                format!("{} was not visited due to crawl bound; its own flows still need review", last.to),
            ],
            Termination::Cycle | Termination::LengthCap => return None,
        };

        let kind = RequirementKind::TerminalRole;
        Some(RequirementPlan {
            title: format!("{} ends the journey ({})", destination, self.flow.termination.as_str()),
            assertions,
            summary: self.summary(kind.clone(), None, None),
            kind,
        })
    }

    fn loop_closure(&self) -> RequirementPlan {
        let destination = self.destination();
        let mut assertions = Vec::new();
        if let Some(last) = self.flow.steps.last() {
            assertions.push(self.describe_step(last));
        }
        assertions.push(format!("{} shows the same content as on the first visit", destination));
        assertions.push(format!("Navigation state is not lost after returning to {}", destination));

        let kind = RequirementKind::LoopClosure;
        RequirementPlan {
            title: format!("Return to {} after {} steps", destination, self.flow.len()),
            assertions,
            summary: self.summary(kind.clone(), None, None),
            kind,
        }
    }

    fn happy_path(&self) -> RequirementPlan {
        let forms = self.form_steps();
        let mut assertions = vec![format!(
            "{} ({}) loads successfully",
            self.entry_label(),
            self.flow.entry.display_path()
        )];

        for step in &self.flow.steps {
            let Some(form_step) = forms.iter().find(|f| std::ptr::eq(f.step, step)) else {
                assertions.push(self.describe_step(step));
                continue;
            };

            for field in form_step.form.visible_fields() {
                match (&field.kind, field.sample_value()) {
                    (FieldKind::Checkbox, Some(_)) if field.required => {
                        assertions.push(format!("Tick {}", field.target()));
                    }
                    (FieldKind::Checkbox, _) => {}
                    (FieldKind::File, _) if field.required => {
                        assertions.push(format!("Attach a small test file to {}", field.target()));
                    }
                    (_, Some(value)) if !value.is_empty() => {
                        assertions.push(format!("Fill {} with \"{}\"", field.target(), value));
                    }
                    _ => {}
                }
            }
            if let Some(submit) = &form_step.form.submit {
                assertions.push(format!("Click the submit control ({}) of {}", submit, form_step.name));
            }
            assertions.push(format!(
                "Submitting {} with valid data on {} raises no validation error",
                form_step.name,
                form_step.page.label()
            ));
            assertions.push(self.describe_step(step));
        }

        let title = match forms.first() {
            Some(first) if forms.len() == 1 => {
                format!("Submit {} on {} with valid data", first.name, first.page.label())
            }
            _ => format!("Complete {} forms from {}", forms.len(), self.entry_label()),
        };

        let kind = RequirementKind::HappyPath;
        RequirementPlan {
            title,
            assertions,
            summary: self.summary(kind.clone(), forms.first(), None),
            kind,
        }
    }

    fn missing_fields(&self) -> Vec<RequirementPlan> {
        let mut plans = Vec::new();

        for form_step in self.form_steps() {
            for field in form_step.form.required_fields() {
                let label = field.display_name().to_string();
                let assertions = vec![
                    format!(
                        "Fill every other required field of {} with valid data",
                        form_step.name
                    ),
                    format!("Leave {} empty and submit {}", field.target(), form_step.name),
                    format!("A validation error is shown for {}", label),
                    format!(
                        "The submission is rejected and {} is shown again",
                        form_step.page.label()
                    ),
                ];

                let kind = RequirementKind::MissingField {
                    form: form_step.name.clone(),
                    field: field.name.clone(),
                };
                plans.push(RequirementPlan {
                    title: format!("Submitting {} without {} is rejected", form_step.name, label),
                    assertions,
                    summary: self.summary(kind.clone(), Some(&form_step), Some(label)),
                    kind,
                });
            }
        }

        plans
    }
}
