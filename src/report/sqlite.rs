//! SQLite export of a run report
//!
//! Each export appends one run; earlier runs in the same database are kept so
//! flows can be compared between crawls.

use crate::report::{CrawlReport, OutputResult};
use crate::synth::RequirementKind;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;

/// SQL schema for the export database
pub const SCHEMA_SQL: &str = r#"
-- One row per exported run
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    status TEXT NOT NULL,
    config_hash TEXT,
    pages_done INTEGER NOT NULL,
    pages_failed INTEGER NOT NULL,
    pages_queued INTEGER NOT NULL,
    pages_in_flight INTEGER NOT NULL
);

-- Page nodes of the flow graph
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    node INTEGER NOT NULL,
    url TEXT NOT NULL,
    title TEXT,
    depth INTEGER NOT NULL,
    status TEXT,
    status_code INTEGER,
    content_type TEXT,
    out_degree INTEGER NOT NULL,
    forms INTEGER NOT NULL,
    revisits INTEGER NOT NULL,
    role TEXT,
    error_message TEXT,
    UNIQUE(run_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_run ON pages(run_id);

-- Enumerated flows
CREATE TABLE IF NOT EXISTS flows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    flow_id TEXT NOT NULL,
    entry_url TEXT NOT NULL,
    pattern TEXT NOT NULL,
    cyclic INTEGER NOT NULL,
    termination TEXT NOT NULL,
    length INTEGER NOT NULL,
    UNIQUE(run_id, flow_id)
);

-- Ordered transitions of each flow
CREATE TABLE IF NOT EXISTS flow_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flow_row INTEGER NOT NULL REFERENCES flows(id),
    position INTEGER NOT NULL,
    from_url TEXT NOT NULL,
    to_url TEXT NOT NULL,
    to_kind TEXT NOT NULL,
    trigger TEXT NOT NULL,
    form_index INTEGER
);

CREATE INDEX IF NOT EXISTS idx_flow_steps_flow ON flow_steps(flow_row);

-- Generated test requirements
CREATE TABLE IF NOT EXISTS requirements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    requirement_id TEXT NOT NULL,
    flow_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    form TEXT,
    field TEXT,
    title TEXT NOT NULL,
    story TEXT NOT NULL,
    UNIQUE(run_id, requirement_id)
);

CREATE TABLE IF NOT EXISTS assertions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    requirement_row INTEGER NOT NULL REFERENCES requirements(id),
    position INTEGER NOT NULL,
    text TEXT NOT NULL
);

-- Frontier entries that ended failed
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    reason TEXT NOT NULL
);

-- Entries left queued or in-flight when the run stopped
CREATE TABLE IF NOT EXISTS unvisited (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    state TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS skipped_links (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    reason TEXT NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY(run_id, reason)
);

CREATE TABLE IF NOT EXISTS warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    flow_id TEXT,
    message TEXT NOT NULL
);
"#;

/// Appends the report to the SQLite database at `path`
///
/// # Arguments
///
/// * `report` - The finished run report
/// * `path` - Database file; created with the schema if missing
///
/// # Returns
///
/// * `Ok(i64)` - Row id of the exported run
/// * `Err(OutputError)` - Failed to open or write the database
pub fn export_sqlite(report: &CrawlReport, path: &Path) -> OutputResult<i64> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;

    let run_id = export_to_connection(report, &mut conn)?;
    tracing::info!("Report exported to {} as run {}", path.display(), run_id);
    Ok(run_id)
}

/// Creates the schema if needed and writes the report in one transaction
pub fn export_to_connection(report: &CrawlReport, conn: &mut Connection) -> OutputResult<i64> {
    conn.execute_batch(SCHEMA_SQL)?;

    let tx = conn.transaction()?;
    let run_id = insert_run(&tx, report)?;
    insert_pages(&tx, run_id, report)?;
    insert_flows(&tx, run_id, report)?;
    insert_requirements(&tx, run_id, report)?;
    insert_frontier(&tx, run_id, report)?;
    tx.commit()?;

    Ok(run_id)
}

fn insert_run(tx: &Transaction<'_>, report: &CrawlReport) -> OutputResult<i64> {
    let counts = &report.frontier.counts;
    tx.execute(
        "INSERT INTO runs (started_at, finished_at, duration_ms, status, config_hash,
                           pages_done, pages_failed, pages_queued, pages_in_flight)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            report.run.started_at.to_rfc3339(),
            report.run.finished_at.to_rfc3339(),
            report.run.duration_ms as i64,
            report.run.status.to_string(),
            report.run.config_hash,
            counts.done as i64,
            counts.failed as i64,
            counts.queued as i64,
            counts.in_flight as i64,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_pages(tx: &Transaction<'_>, run_id: i64, report: &CrawlReport) -> OutputResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO pages (run_id, node, url, title, depth, status, status_code, content_type,
                            out_degree, forms, revisits, role, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;

    for page in &report.pages {
        stmt.execute(params![
            run_id,
            page.id.index() as i64,
            page.key.as_str(),
            page.title,
            page.depth,
            page.status.map(|status| status.as_str()),
            page.status_code,
            page.content_type,
            page.out_degree as i64,
            page.forms as i64,
            page.revisits,
            page.role.map(|role| format!("{:?}", role).to_lowercase()),
            page.error,
        ])?;
    }
    Ok(())
}

fn insert_flows(tx: &Transaction<'_>, run_id: i64, report: &CrawlReport) -> OutputResult<()> {
    let mut flow_stmt = tx.prepare(
        "INSERT INTO flows (run_id, flow_id, entry_url, pattern, cyclic, termination, length)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut step_stmt = tx.prepare(
        "INSERT INTO flow_steps (flow_row, position, from_url, to_url, to_kind, trigger, form_index)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for flow in &report.flows {
        flow_stmt.execute(params![
            run_id,
            flow.id,
            flow.entry.as_str(),
            flow.pattern.as_str(),
            flow.cyclic,
            flow.termination.as_str(),
            flow.len() as i64,
        ])?;
        let flow_row = tx.last_insert_rowid();

        for (position, step) in flow.steps.iter().enumerate() {
            let (trigger, form_index) = match step.trigger {
                crate::graph::Trigger::Link => ("link", None),
                crate::graph::Trigger::FormSubmit { form } => ("form_submit", Some(form as i64)),
            };
            step_stmt.execute(params![
                flow_row,
                position as i64,
                step.from.as_str(),
                step.to.as_str(),
                format!("{:?}", step.to_kind).to_lowercase(),
                trigger,
                form_index,
            ])?;
        }
    }
    Ok(())
}

fn insert_requirements(tx: &Transaction<'_>, run_id: i64, report: &CrawlReport) -> OutputResult<()> {
    let mut requirement_stmt = tx.prepare(
        "INSERT INTO requirements (run_id, requirement_id, flow_id, kind, form, field, title, story)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut assertion_stmt = tx.prepare(
        "INSERT INTO assertions (requirement_row, position, text) VALUES (?1, ?2, ?3)",
    )?;

    for requirement in &report.requirements {
        let (form, field) = match &requirement.kind {
            RequirementKind::MissingField { form, field } => (Some(form.as_str()), Some(field.as_str())),
            _ => (None, None),
        };
        requirement_stmt.execute(params![
            run_id,
            requirement.id,
            requirement.flow_id,
            requirement.kind.as_str(),
            form,
            field,
            requirement.title,
            requirement.story,
        ])?;
        let requirement_row = tx.last_insert_rowid();

        for (position, assertion) in requirement.assertions.iter().enumerate() {
            assertion_stmt.execute(params![requirement_row, position as i64, assertion])?;
        }
    }
    Ok(())
}

fn insert_frontier(tx: &Transaction<'_>, run_id: i64, report: &CrawlReport) -> OutputResult<()> {
    for failure in &report.frontier.failures {
        tx.execute(
            "INSERT INTO failures (run_id, url, reason) VALUES (?1, ?2, ?3)",
            params![run_id, failure.key.as_str(), failure.reason],
        )?;
    }

    let unvisited = report
        .frontier
        .unvisited
        .iter()
        .map(|key| (key, "queued"))
        .chain(report.frontier.in_flight_at_cutoff.iter().map(|key| (key, "in_flight")));
    for (key, state) in unvisited {
        tx.execute(
            "INSERT INTO unvisited (run_id, url, state) VALUES (?1, ?2, ?3)",
            params![run_id, key.as_str(), state],
        )?;
    }

    for (reason, count) in &report.frontier.skipped {
        tx.execute(
            "INSERT INTO skipped_links (run_id, reason, count) VALUES (?1, ?2, ?3)",
            params![run_id, reason.as_str(), *count as i64],
        )?;
    }

    for warning in &report.warnings {
        tx.execute(
            "INSERT INTO warnings (run_id, flow_id, message) VALUES (?1, ?2, ?3)",
            params![run_id, warning.flow_id, warning.message],
        )?;
    }
    Ok(())
}
