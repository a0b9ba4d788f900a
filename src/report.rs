//! Human and machine readable renderings of assertion outcomes.
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{bail, Context, Result};

use crate::types::{AssertionOutcome, RunSummary};

/// Write outcomes as TAP version 14. Failing tests carry a YAML `reason`.
pub fn write_tap<W: Write>(w: &mut W, outcomes: &[AssertionOutcome]) -> Result<()> {
    if outcomes.is_empty() {
        bail!("no tests were found");
    }

    writeln!(w, "TAP version 14")?;
    writeln!(w, "1..{}", outcomes.len())?;
    for (index, o) in outcomes.iter().enumerate() {
        if o.passed {
            writeln!(w, "ok {} - {}", index + 1, o.name())?;
        } else {
            // A JSON string is a valid YAML flow scalar, quotes and escapes included.
            let reason = serde_json::to_string(&o.message)?;
            writeln!(w, "not ok {} - {}", index + 1, o.name())?;
            writeln!(w, "  ---\n  reason: {reason}\n  ...")?;
        }
    }
    Ok(())
}

pub fn write_tap_file(path: &Path, outcomes: &[AssertionOutcome]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create TAP file: {}", path.display()))?;
    write_tap(&mut file, outcomes)
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create JSON file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}

/// Render a fixed-width result table.
pub fn write_table<W: Write>(w: &mut W, summary: &RunSummary) -> io::Result<()> {
    let name_w = summary
        .outcomes
        .iter()
        .map(|o| o.name().len())
        .max()
        .unwrap_or(0)
        .max("check".len());
    let res_w = "result".len();

    writeln!(
        w,
        "\nAssertions: {} (passed: {}, failed: {})",
        summary.total, summary.passed, summary.failed
    )?;
    writeln!(w, "{:<name_w$}  {:<res_w$}  {}", "check", "result", "detail")?;
    writeln!(w, "{:-<name_w$}  {:-<res_w$}  {:-<6}", "", "", "")?;
    for o in &summary.outcomes {
        let result = if o.passed { "pass" } else { "FAIL" };
        let mut detail = o.message.clone();
        if detail.len() > 100 {
            let cut = (0..=100).rev().find(|i| detail.is_char_boundary(*i)).unwrap_or(0);
            detail.truncate(cut);
        }
        writeln!(w, "{:<name_w$}  {:<res_w$}  {}", o.name(), result, detail)?;
    }
    Ok(())
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
