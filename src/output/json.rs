//! JSON run summary

use super::RunReport;
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write `report` to `output_path`, pretty-printed
pub fn write_json_summary(output_path: &Path, report: &RunReport) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create summary: {}", output_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write summary: {}", output_path.display()))?;
    Ok(())
}
