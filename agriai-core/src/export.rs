//! Report export to Markdown documents.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::format::{expires_in, format_countdown};
use crate::types::ReportEntry;

/// File name for `report` exported at `exported_at` (UTC).
///
/// `AgriAI_Report_{short id}_{YYYYMMDD}_{HHMM}.md`
pub fn export_file_name(report: &ReportEntry, exported_at: DateTime<Utc>) -> String {
    format!(
        "AgriAI_Report_{}_{}.md",
        report.short_id(),
        exported_at.format("%Y%m%d_%H%M")
    )
}

/// Render a report as a Markdown document.
pub fn render_report(report: &ReportEntry, ttl: Duration, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# AgriAI Analysis Report #{}", report.short_id());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- **Created:** {}",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "- **Status:** {}", report.status.as_str());
    let _ = writeln!(out, "- **Classification:** {}", report.classification);
    let _ = writeln!(out, "- **Confidence:** {}%", report.confidence);
    if let Some(type_name) = &report.type_name {
        let _ = writeln!(out, "- **Type:** {}", type_name);
    }
    let _ = writeln!(
        out,
        "- **Expires in:** {}",
        format_countdown(expires_in(report.timestamp, ttl, now))
    );

    section(&mut out, "Summary", report.summary.as_deref());
    section(&mut out, "Explanation", report.explanation.as_deref());
    section(&mut out, "AI Reasoning", report.ai_reasoning.as_deref());
    section(&mut out, "Growth Information", report.growth_info.as_deref());
    list(&mut out, "Solutions", &report.solutions);
    list(&mut out, "Drone Actions", &report.drone_actions);

    out
}

fn section(out: &mut String, title: &str, body: Option<&str>) {
    if let Some(body) = body.filter(|b| !b.trim().is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", title);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", body.trim());
    }
}

fn list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "## {}", title);
    let _ = writeln!(out);
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, item);
    }
}

/// Write `report` into `dir` and return the path of the new document.
///
/// The document is written beside its final name and renamed into place,
/// so a failed export leaves nothing behind.
pub fn export_report(
    report: &ReportEntry,
    dir: &Path,
    exported_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| {
        Error::Export(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let path = dir.join(export_file_name(report, exported_at));
    let partial = path.with_extension("md.partial");
    let contents = render_report(report, ttl, exported_at);

    let written = fs::write(&partial, contents).and_then(|_| fs::rename(&partial, &path));
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(Error::Export(format!(
            "cannot write {}: {}",
            path.display(),
            e
        )));
    }

    tracing::info!(report_id = %report.id, path = %path.display(), "Report exported");
    Ok(path)
}
