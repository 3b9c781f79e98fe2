//! Report generation
//!
//! Renders one bus comparison as TXT, HTML or JSON, and the run summary table
//! printed at the end of a run.

pub mod html;
pub mod json;
pub mod txt;

use crate::config::OutputFormat;
use anyhow::{Context, Result};
use dbc_compare::{BusComparison, RunSummary, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a renderer needs for one bus
pub struct ReportContext<'a> {
    /// Label of the old release (old folder name)
    pub old_label: &'a str,
    /// Label of the new release (new folder name)
    pub new_label: &'a str,
    pub bus: &'a BusComparison,
}

impl<'a> ReportContext<'a> {
    pub fn title(&self) -> String {
        format!(
            "DBC Compare: {} vs {} [{}]",
            self.old_label, self.new_label, self.bus.pair.bus_name
        )
    }

    /// `<label>\<file name>` of both sides
    pub fn file_labels(&self) -> (String, String) {
        (
            format!("{}\\{}", self.old_label, file_name(&self.bus.pair.old)),
            format!("{}\\{}", self.new_label, file_name(&self.bus.pair.new)),
        )
    }
}

/// `DBC_Compare_<old>_vs_<new>_<BUS>`
pub fn base_name(old_label: &str, new_label: &str, bus_name: &str) -> String {
    format!("DBC_Compare_{}_vs_{}_{}", old_label, new_label, bus_name)
}

/// Render one report and write it to `output_dir`
pub fn write_report(format: OutputFormat, ctx: &ReportContext<'_>, output_dir: &Path) -> Result<PathBuf> {
    let content = match format {
        OutputFormat::Txt => txt::render(ctx).context("Failed to render TXT report")?,
        OutputFormat::Html => html::render(ctx).context("Failed to render HTML report")?,
        OutputFormat::Json => json::render(ctx)?,
    };

    let path = output_dir.join(format!(
        "{}.{}",
        base_name(ctx.old_label, ctx.new_label, &ctx.bus.pair.bus_name),
        format.extension()
    ));
    fs::write(&path, content).with_context(|| format!("Failed to write report: {:?}", path))?;
    log::info!("Report written: {:?}", path);
    Ok(path)
}

/// Per-bus row counts with a TOTAL row
pub fn summary_table(summary: &RunSummary) -> String {
    let rule = format!("{} {} {}\n", "-".repeat(15), "-".repeat(12), "-".repeat(13));
    let mut out = format!("{:<15} {:>12} {:>13}\n", "Bus", "Total Rows", "Differences");
    out.push_str(&rule);
    for bus in &summary.buses {
        out.push_str(&format!(
            "{:<15} {:>12} {:>13}\n",
            bus.bus_name, bus.total_rows, bus.differing_rows
        ));
    }
    out.push_str(&rule);
    out.push_str(&format!(
        "{:<15} {:>12} {:>13}\n",
        "TOTAL", summary.total_rows, summary.differing_rows
    ));
    out
}

/// Cell text of a value; absent values render as "-"
pub(crate) fn cell(value: &Value) -> String {
    if value.is_absent() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
