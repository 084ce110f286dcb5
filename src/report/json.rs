//! JSON report emitter

use crate::report::{CrawlReport, OutputResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serializes the report as pretty-printed JSON
pub fn to_json_string(report: &CrawlReport) -> OutputResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Writes the report as JSON to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to serialize or write
pub fn write_json(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    tracing::info!("JSON report written to {}", output_path.display());
    Ok(())
}
