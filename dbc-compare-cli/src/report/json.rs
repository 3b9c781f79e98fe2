//! JSON report

use super::ReportContext;
use anyhow::{Context, Result};
use dbc_compare::{ComparisonResult, ComparisonSummary, DatabaseStats};
use serde::Serialize;

#[derive(Serialize)]
struct JsonReport<'a> {
    tool_version: &'static str,
    bus_name: &'a str,
    old_label: &'a str,
    new_label: &'a str,
    old_file: String,
    new_file: String,
    old_stats: DatabaseStats,
    new_stats: DatabaseStats,
    summary: ComparisonSummary,
    result: &'a ComparisonResult,
}

pub fn render(ctx: &ReportContext<'_>) -> Result<String> {
    let (old_file, new_file) = ctx.file_labels();
    let report = JsonReport {
        tool_version: dbc_compare::VERSION,
        bus_name: &ctx.bus.pair.bus_name,
        old_label: ctx.old_label,
        new_label: ctx.new_label,
        old_file,
        new_file,
        old_stats: ctx.bus.old.stats(),
        new_stats: ctx.bus.new.stats(),
        summary: ctx.bus.result.summary(),
        result: &ctx.bus.result,
    };

    serde_json::to_string_pretty(&report).context("Failed to serialize JSON report")
}
