//! `dae verify`.

use std::path::Path;

use anyhow::{Context, Result};
use dae_core::RunReport;

/// Loads a report and re-verifies evidence ids, finding seals, evidence links
/// and the audit chain.
pub fn run(report_path: &Path) -> Result<()> {
    let report = load(report_path)?;
    report
        .verify()
        .with_context(|| format!("{} failed verification", report_path.display()))?;
    println!(
        "report {} verified: {} findings, {} evidence records, {} audit entries",
        report.run_id,
        report.findings.len(),
        report.evidence.len(),
        report.audit_trail.len()
    );
    Ok(())
}

pub(crate) fn load(report_path: &Path) -> Result<RunReport> {
    let bytes = std::fs::read(report_path)
        .with_context(|| format!("reading {}", report_path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", report_path.display()))
}
