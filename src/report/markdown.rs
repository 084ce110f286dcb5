//! Markdown report generation
//!
//! This module renders the report for people: run status, frontier and graph
//! statistics, then every flow with its test requirements.

use crate::graph::{NodeKind, Trigger};
use crate::report::{CrawlReport, OutputResult};
use crate::synth::Flow;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Most URLs listed in one section before the rest are elided
const MAX_LISTED_URLS: usize = 50;

/// Writes the report as Markdown to `output_path`
///
/// # Arguments
///
/// * `report` - The finished run report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the file
pub fn write_markdown(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    tracing::info!("Markdown report written to {}", output_path.display());
    Ok(())
}

/// Formats a report as markdown
pub fn format_markdown_report(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# Wayfinder Flow Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Status**: {}\n", report.run.status));
    md.push_str(&format!("- **Started**: {}\n", report.run.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.run.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        report.run.duration_ms as f64 / 1000.0
    ));
    if let Some(hash) = &report.run.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    for entry in &report.run.entry_urls {
        md.push_str(&format!("- **Entry URL**: {}\n", entry));
    }
    md.push('\n');

    if report.run.status.is_partial() {
        md.push_str(
            "> This run stopped early. Flows and requirements cover only the pages discovered before the cutoff.\n\n",
        );
    }

    // Frontier
    let counts = &report.frontier.counts;
    md.push_str("## Frontier\n\n");
    md.push_str("| State | Count |\n");
    md.push_str("|-------|-------|\n");
    md.push_str(&format!("| Done | {} |\n", counts.done));
    md.push_str(&format!("| Failed | {} |\n", counts.failed));
    md.push_str(&format!("| Queued (not visited) | {} |\n", counts.queued));
    md.push_str(&format!("| In flight at cutoff | {} |\n", counts.in_flight));
    md.push_str(&format!("| **Total** | {} |\n\n", counts.total));
    md.push_str(&format!("- **Retries**: {}\n", report.frontier.retries));
    md.push_str(&format!(
        "- **Links skipped**: {}\n\n",
        report.frontier.skipped_total()
    ));

    if !report.frontier.skipped.is_empty() {
        md.push_str("### Skipped Links\n\n");
        md.push_str("| Reason | Count |\n");
        md.push_str("|--------|-------|\n");
        for (reason, count) in &report.frontier.skipped {
            md.push_str(&format!("| {} | {} |\n", reason.as_str(), count));
        }
        md.push('\n');
    }

    if !report.frontier.failures.is_empty() {
        md.push_str("### Failures\n\n");
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for (kind, count) in &report.frontier.failure_reasons {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
        for failure in report.frontier.failures.iter().take(MAX_LISTED_URLS) {
            md.push_str(&format!("- {}: {}\n", failure.key, failure.reason));
        }
        md.push('\n');
    }

    push_url_list(&mut md, "Not Visited Due to Bound", &report.frontier.unvisited);
    push_url_list(
        &mut md,
        "In Flight at Cutoff",
        &report.frontier.in_flight_at_cutoff,
    );

    // Graph
    let graph = &report.graph;
    md.push_str("## Flow Graph\n\n");
    md.push_str(&format!("- **Pages**: {}\n", graph.pages));
    md.push_str(&format!(
        "- **Edges**: {} ({} links, {} form submissions)\n",
        graph.edges, graph.link_edges, graph.form_edges
    ));
    md.push_str(&format!("- **Edges to external pages**: {}\n", graph.external_edges));
    md.push_str(&format!("- **Edges to failed pages**: {}\n", graph.failed_edges));
    md.push_str(&format!(
        "- **Edges to pages not visited due to crawl bound**: {}\n",
        graph.unvisited_edges
    ));
    md.push_str(&format!("- **Aliases**: {}\n\n", graph.aliases));

    if !report.pages.is_empty() {
        md.push_str("| Depth | Page | Title | Out | Forms |\n");
        md.push_str("|-------|------|-------|-----|-------|\n");
        for page in &report.pages {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                page.depth,
                page.key,
                page.title.as_deref().map(escape_cell).unwrap_or_default(),
                page.out_degree,
                page.forms
            ));
        }
        md.push('\n');
    }

    // Flows
    md.push_str(&format!("## Flows ({})\n\n", report.flows.len()));
    if report.flow_cap_hit {
        md.push_str("> Flow enumeration stopped at the configured cap.\n\n");
    }
    for flow in &report.flows {
        push_flow(&mut md, report, flow);
    }

    if !report.warnings.is_empty() {
        md.push_str("## Synthesis Warnings\n\n");
        for warning in &report.warnings {
            match &warning.flow_id {
                Some(flow_id) => md.push_str(&format!("- {}: {}\n", flow_id, warning.message)),
                None => md.push_str(&format!("- {}\n", warning.message)),
            }
        }
        md.push('\n');
    }

    md
}

fn push_flow(md: &mut String, report: &CrawlReport, flow: &Flow) {
    let mut classification = flow.pattern.as_str().to_string();
    if flow.cyclic {
        classification.push_str(", cyclic");
    }

    md.push_str(&format!("### {} ({})\n\n", flow.id, classification));
    md.push_str(&format!("- **Entry**: {}\n", flow.entry));
    md.push_str(&format!("- **Ends**: {}\n\n", flow.termination.as_str()));

    for (index, step) in flow.steps.iter().enumerate() {
        let action = match step.trigger {
            Trigger::Link => "follow link".to_string(),
            Trigger::FormSubmit { form } => format!("submit form #{}", form + 1),
        };
        let target = match step.to_kind {
            NodeKind::Page => step.to.to_string(),
            NodeKind::External => format!("{} (external)", step.to),
            NodeKind::Failed => format!("{} (failed)", step.to),
            NodeKind::Unvisited => format!("{} (not visited due to crawl bound)", step.to),
        };
        md.push_str(&format!(
            "{}. {}: {} -> {}\n",
            index + 1,
            action,
            step.from.display_path(),
            target
        ));
    }
    md.push('\n');

    for requirement in report.requirements_for(&flow.id) {
        md.push_str(&format!("#### {} {}\n\n", requirement.id, requirement.title));
        md.push_str(&format!("{}\n\n", requirement.story));
        for assertion in &requirement.assertions {
            md.push_str(&format!("- [ ] {}\n", assertion));
        }
        md.push('\n');
    }
}

fn push_url_list(md: &mut String, heading: &str, urls: &[crate::url::UrlKey]) {
    if urls.is_empty() {
        return;
    }
    md.push_str(&format!("### {} ({})\n\n", heading, urls.len()));
    for url in urls.iter().take(MAX_LISTED_URLS) {
        md.push_str(&format!("- {}\n", url));
    }
    if urls.len() > MAX_LISTED_URLS {
        md.push_str(&format!("\n... and {} more\n", urls.len() - MAX_LISTED_URLS));
    }
    md.push('\n');
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::create_test_report;

    #[tokio::test]
    async fn test_format_markdown_report() {
        let report = create_test_report().await;
        let markdown = format_markdown_report(&report);

        assert!(markdown.contains("# Wayfinder Flow Report"));
        assert!(markdown.contains("- **Status**: partial (max_pages)"));
        assert!(markdown.contains("This run stopped early"));
        assert!(markdown.contains("## Flows (2)"));
    }

    #[tokio::test]
    async fn test_markdown_lists_flow_steps_and_requirements() {
        let report = create_test_report().await;
        let markdown = format_markdown_report(&report);

        assert!(markdown.contains("form-driven"));
        assert!(markdown.contains("navigation, cyclic"));
        assert!(markdown.contains("submit form #1"));
        assert!(markdown.contains("(external)"));
        assert!(markdown.contains("FLOW-001-R01"));
        assert!(markdown.contains("- [ ] "));
    }

    #[tokio::test]
    async fn test_markdown_lists_unvisited() {
        let report = create_test_report().await;
        let markdown = format_markdown_report(&report);

        assert!(markdown.contains("### Not Visited Due to Bound (2)"));
        assert!(markdown.contains("https://example.com/pricing"));
    }
}
