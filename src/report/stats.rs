//! Console summary of a run
//!
//! Printed by the binary after the reports are written.

use crate::report::CrawlReport;
use crate::synth::TriggerPattern;

/// Flow counts by trigger pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowBreakdown {
    pub navigation: usize,
    pub form_driven: usize,
    pub mixed: usize,
    pub cyclic: usize,
}

impl FlowBreakdown {
    pub fn from_report(report: &CrawlReport) -> Self {
        let mut breakdown = Self::default();
        for flow in &report.flows {
            match flow.pattern {
                TriggerPattern::Navigation => breakdown.navigation += 1,
                TriggerPattern::FormDriven => breakdown.form_driven += 1,
                TriggerPattern::Mixed => breakdown.mixed += 1,
            }
            if flow.cyclic {
                breakdown.cyclic += 1;
            }
        }
        breakdown
    }
}

/// Prints run statistics to stdout
pub fn print_summary(report: &CrawlReport) {
    let counts = &report.frontier.counts;

    println!("=== Wayfinder Run Summary ===\n");

    println!("Run:");
    println!("  Status: {}", report.run.status);
    println!("  Duration: {:.2}s", report.run.duration_ms as f64 / 1000.0);
    println!();

    println!("Frontier:");
    println!("  Done: {}", counts.done);
    println!("  Failed: {}", counts.failed);
    println!("  Not visited (bound): {}", counts.queued);
    println!("  In flight at cutoff: {}", counts.in_flight);
    println!("  Total: {}", counts.total);
    if !report.frontier.conserved {
        println!("  WARNING: frontier counts do not add up");
    }
    println!();

    if !report.frontier.failure_reasons.is_empty() {
        println!("Failures:");
        for (kind, count) in &report.frontier.failure_reasons {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !report.frontier.skipped.is_empty() {
        println!("Skipped links:");
        for (reason, count) in &report.frontier.skipped {
            println!("  {}: {}", reason.as_str(), count);
        }
        println!();
    }

    let graph = &report.graph;
    println!("Graph:");
    println!("  Pages: {}", graph.pages);
    println!(
        "  Edges: {} ({} links, {} forms, {} external, {} failed, {} unvisited)",
        graph.edges,
        graph.link_edges,
        graph.form_edges,
        graph.external_edges,
        graph.failed_edges,
        graph.unvisited_edges
    );
    println!();

    let flows = FlowBreakdown::from_report(report);
    println!("Flows: {}", report.flows.len());
    println!("  Navigation: {}", flows.navigation);
    println!("  Form-driven: {}", flows.form_driven);
    println!("  Mixed: {}", flows.mixed);
    println!("  Cyclic: {}", flows.cyclic);
    println!();

    println!("Test requirements: {}", report.requirements.len());
    if !report.warnings.is_empty() {
        println!("Synthesis warnings: {}", report.warnings.len());
    }
}
