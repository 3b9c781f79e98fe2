//! Plain text report

use super::{cell, ReportContext};
use dbc_compare::{FieldChange, FullRow, MessageRef, SignalRef};
use std::fmt::{self, Write};

const RULE: &str = "===============================================================";
const THIN_RULE: &str = "---------------------------------------------------------------";

pub fn render(ctx: &ReportContext<'_>) -> Result<String, fmt::Error> {
    let result = &ctx.bus.result;
    let summary = result.summary();
    let (old_file, new_file) = ctx.file_labels();
    let mut out = String::new();

    writeln!(out, "{}", RULE)?;
    writeln!(out, "  {}", ctx.title())?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Old: {}", old_file)?;
    writeln!(out, "New: {}", new_file)?;
    writeln!(out)?;

    writeln!(out, "SUMMARY")?;
    writeln!(out, "{}", THIN_RULE)?;
    for (label, count) in [
        ("New messages", summary.new_messages),
        ("Removed messages", summary.removed_messages),
        ("Modified messages", summary.modified_messages),
        ("Unchanged messages", summary.unchanged_messages),
        ("New signals", summary.new_signals),
        ("Removed signals", summary.removed_signals),
        ("Modified signals", summary.modified_signals),
        ("Unchanged signals", summary.unchanged_signals),
        ("Total rows", summary.total_rows),
        ("Rows with differences", summary.differing_rows),
    ] {
        writeln!(out, "  {:<24}{:>8}", label, count)?;
    }
    if summary.total_changes() == 0 {
        writeln!(out, "\nNo differences found.")?;
        return Ok(out);
    }

    message_list(&mut out, "NEW MESSAGES", &result.new_messages)?;
    message_list(&mut out, "REMOVED MESSAGES", &result.removed_messages)?;

    if !result.modified_messages.is_empty() {
        section(&mut out, "MODIFIED MESSAGES", result.modified_messages.len())?;
        for change in &result.modified_messages {
            writeln!(out, "  {} {}", change.message.id_hex(), change.message.name)?;
            changes(&mut out, &change.changes)?;
        }
    }

    signal_list(&mut out, "NEW SIGNALS", &result.new_signals)?;
    signal_list(&mut out, "REMOVED SIGNALS", &result.removed_signals)?;

    if !result.modified_signals.is_empty() {
        section(&mut out, "MODIFIED SIGNALS", result.modified_signals.len())?;
        for change in &result.modified_signals {
            writeln!(
                out,
                "  {} {} / {}",
                change.signal.message.id_hex(),
                change.signal.message.name,
                change.signal.name
            )?;
            changes(&mut out, &change.changes)?;
        }
    }

    let differing: Vec<&FullRow> = result.differing_rows().collect();
    section(&mut out, "ROWS WITH DIFFERENCES", differing.len())?;
    for row in differing {
        full_row(&mut out, row)?;
    }

    Ok(out)
}

fn section(out: &mut String, title: &str, count: usize) -> fmt::Result {
    writeln!(out, "\n{} ({})", title, count)?;
    writeln!(out, "{}", THIN_RULE)
}

fn message_list(out: &mut String, title: &str, messages: &[MessageRef]) -> fmt::Result {
    if messages.is_empty() {
        return Ok(());
    }
    section(out, title, messages.len())?;
    for message in messages {
        writeln!(out, "  {:<12}{}", message.id_hex(), message.name)?;
    }
    Ok(())
}

fn signal_list(out: &mut String, title: &str, signals: &[SignalRef]) -> fmt::Result {
    if signals.is_empty() {
        return Ok(());
    }
    section(out, title, signals.len())?;
    for signal in signals {
        writeln!(
            out,
            "  {:<12}{:<32}{}",
            signal.message.id_hex(),
            signal.message.name,
            signal.name
        )?;
    }
    Ok(())
}

fn changes<F: fmt::Display>(out: &mut String, changes: &[FieldChange<F>]) -> fmt::Result {
    for change in changes {
        writeln!(
            out,
            "      {:<18}{} -> {}",
            change.field.to_string(),
            cell(&change.old),
            cell(&change.new)
        )?;
    }
    Ok(())
}

fn full_row(out: &mut String, row: &FullRow) -> fmt::Result {
    let state = match (&row.old, &row.new) {
        (None, _) => "new message",
        (_, None) => "removed message",
        (Some(old), Some(new)) => match (&old.signal, &new.signal) {
            (None, Some(_)) => "new signal",
            (Some(_), None) => "removed signal",
            _ => "changed",
        },
    };
    writeln!(
        out,
        "  0x{:<10X}{:<32}[{}]",
        row.message_id,
        row.signal.as_deref().unwrap_or("-"),
        state
    )?;

    if let (Some(old), Some(new)) = (&row.old, &row.new) {
        for &column in &row.changed_columns {
            writeln!(
                out,
                "      {:<18}{} -> {}",
                column.to_string(),
                cell(&old.value(column)),
                cell(&new.value(column))
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_comparison;

    #[test]
    fn test_render_sections() {
        let (_dir, bus) = sample_comparison();
        let ctx = ReportContext {
            old_label: "EP1",
            new_label: "EP2",
            bus: &bus,
        };
        let text = render(&ctx).unwrap();

        assert!(text.contains("DBC Compare: EP1 vs EP2 [PT]"));
        assert!(text.contains("Old: EP1\\01_PT_EP1.dbc"));
        assert!(text.contains("REMOVED MESSAGES (1)"));
        assert!(text.contains("NEW SIGNALS (1)"));
        assert!(text.contains("MODIFIED SIGNALS (1)"));
        assert!(text.contains("CycleTime         100 -> 50"));
        assert!(text.contains("Length            8 -> 16"));
        assert!(text.contains("[removed message]"));
        assert!(!text.contains("NEW MESSAGES"));
    }

    #[test]
    fn test_render_no_differences() {
        let (_dir, mut bus) = sample_comparison();
        bus.result = dbc_compare::compare(&bus.old, &bus.old);
        let ctx = ReportContext {
            old_label: "EP1",
            new_label: "EP1",
            bus: &bus,
        };
        assert!(render(&ctx).unwrap().contains("No differences found."));
    }
}
