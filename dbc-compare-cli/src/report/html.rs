//! Self-contained HTML report

use super::{cell, ReportContext};
use dbc_compare::{Column, Database, FieldChange, FullRow, MessageRef, RowSide, SignalRef};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Write};

const CSS: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: 'Segoe UI', Tahoma, sans-serif; color: #333; background: #f4f6f9; padding: 30px; }
.container { max-width: 1400px; margin: 0 auto; }
h1 { color: #1F4E79; font-size: 28px; margin-bottom: 4px; }
.subtitle { color: #777; font-size: 14px; margin-bottom: 20px; }
.cards { display: flex; gap: 16px; flex-wrap: wrap; margin-bottom: 30px; }
.card { background: #fff; border-radius: 8px; padding: 18px 24px; box-shadow: 0 2px 8px rgba(0,0,0,0.07); min-width: 150px; flex: 1; }
.card .label { font-size: 12px; color: #888; text-transform: uppercase; letter-spacing: 0.5px; }
.card .value { font-size: 28px; font-weight: 700; color: #1F4E79; margin-top: 4px; }
.card.new .value { color: #27AE60; }
.card.removed .value { color: #E74C3C; }
.card.modified .value { color: #F39C12; }
section { background: #fff; border-radius: 8px; padding: 24px; margin-bottom: 24px; box-shadow: 0 2px 8px rgba(0,0,0,0.07); overflow-x: auto; }
section h2 { color: #1F4E79; font-size: 18px; margin-bottom: 14px; border-bottom: 2px solid #D6E4F0; padding-bottom: 8px; }
table { width: 100%; border-collapse: collapse; font-size: 13px; }
th { background: #1F4E79; color: #fff; padding: 10px 8px; text-align: left; font-weight: 600; white-space: nowrap; }
td { padding: 8px; border-bottom: 1px solid #e8e8e8; }
tr.alt td { background: #f8f9fa; }
tr.context td { background: #E2EFDA; }
td.diff { background: #FFC7CE !important; font-weight: 600; }
.empty { color: #aaa; font-style: italic; padding: 20px 0; }
.footer { text-align: center; color: #aaa; font-size: 11px; margin-top: 30px; }
"#;

pub fn render(ctx: &ReportContext<'_>) -> Result<String, fmt::Error> {
    let bus = ctx.bus;
    let result = &bus.result;
    let summary = result.summary();
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M");
    let (old_file, new_file) = ctx.file_labels();

    let mut out = String::new();
    write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>{css}</style>
</head>
<body>
<div class="container">
<h1>DBC Comparison Report: {bus_name}</h1>
<p class="subtitle">{old} &rarr; {new} &bull; {old_file} &rarr; {new_file} &bull; Generated {generated}</p>
"#,
        title = escape(ctx.title()),
        css = CSS,
        bus_name = escape(&bus.pair.bus_name),
        old = escape(ctx.old_label),
        new = escape(ctx.new_label),
        old_file = escape(old_file),
        new_file = escape(new_file),
        generated = generated,
    )?;

    let old_stats = bus.old.stats();
    let new_stats = bus.new.stats();
    cards(
        &mut out,
        &[
            ("", "Messages (Base)", old_stats.num_messages),
            ("", "Messages (New)", new_stats.num_messages),
            ("", "Signals (Base)", old_stats.num_signals),
            ("", "Signals (New)", new_stats.num_signals),
        ],
    )?;
    cards(
        &mut out,
        &[
            ("new", "New Messages", summary.new_messages),
            ("removed", "Removed Messages", summary.removed_messages),
            ("modified", "Modified Messages", summary.modified_messages),
            ("new", "New Signals", summary.new_signals),
            ("removed", "Removed Signals", summary.removed_signals),
            ("modified", "Modified Signals", summary.modified_signals),
        ],
    )?;

    message_section(&mut out, "New Messages", &result.new_messages, &bus.new)?;
    message_section(&mut out, "Removed Messages", &result.removed_messages, &bus.old)?;

    section_start(&mut out, "Modified Messages")?;
    if result.modified_messages.is_empty() {
        empty(&mut out, "No modified messages")?;
    } else {
        table_head(&mut out, &["Msg ID", "Msg Name", "Column", "Base", "New"])?;
        for (i, change) in result.modified_messages.iter().enumerate() {
            let prefix = [change.message.id_hex(), change.message.name.clone()];
            change_rows(&mut out, i, &prefix, &change.changes)?;
        }
        table_end(&mut out);
    }
    section_end(&mut out);

    signal_section(&mut out, "New Signals", &result.new_signals)?;
    signal_section(&mut out, "Removed Signals", &result.removed_signals)?;

    section_start(&mut out, "Modified Signals")?;
    if result.modified_signals.is_empty() {
        empty(&mut out, "No modified signals")?;
    } else {
        table_head(
            &mut out,
            &["Msg ID", "Msg Name", "Signal", "Column", "Base", "New"],
        )?;
        for (i, change) in result.modified_signals.iter().enumerate() {
            let prefix = [
                change.signal.message.id_hex(),
                change.signal.message.name.clone(),
                change.signal.name.clone(),
            ];
            change_rows(&mut out, i, &prefix, &change.changes)?;
        }
        table_end(&mut out);
    }
    section_end(&mut out);

    full_comparison(&mut out, ctx, &result.full_rows)?;

    write!(
        out,
        "<div class=\"footer\">Generated by dbc-compare {}</div>\n</div></body></html>\n",
        dbc_compare::VERSION
    )?;
    Ok(out)
}

/// Escape text for HTML element content and attribute values
fn escape(text: impl AsRef<str>) -> String {
    let text = text.as_ref();
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\n' => escaped.push_str("<br>"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn cards(out: &mut String, cards: &[(&str, &str, usize)]) -> fmt::Result {
    out.push_str("<div class=\"cards\">\n");
    for (class, label, value) in cards {
        let class = if class.is_empty() {
            "card".to_string()
        } else {
            format!("card {}", class)
        };
        writeln!(
            out,
            "<div class=\"{}\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>",
            class, label, value
        )?;
    }
    out.push_str("</div>\n");
    Ok(())
}

fn section_start(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out, "<section><h2>{}</h2>", title)
}

fn section_end(out: &mut String) {
    out.push_str("</section>\n");
}

fn empty(out: &mut String, text: &str) -> fmt::Result {
    writeln!(out, "<p class=\"empty\">{}</p>", text)
}

fn table_head<H: Display>(out: &mut String, headers: &[H]) -> fmt::Result {
    out.push_str("<table>\n<thead><tr>");
    for header in headers {
        write!(out, "<th>{}</th>", escape(header.to_string()))?;
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    Ok(())
}

fn table_end(out: &mut String) {
    out.push_str("</tbody>\n</table>\n");
}

fn row_open(out: &mut String, index: usize) {
    out.push_str(if index % 2 == 1 { "<tr class=\"alt\">" } else { "<tr>" });
}

fn td(out: &mut String, text: &str, diff: bool) -> fmt::Result {
    let class = if diff { " class=\"diff\"" } else { "" };
    let text = if text.is_empty() { "&mdash;".to_string() } else { escape(text) };
    write!(out, "<td{}>{}</td>", class, text)
}

fn message_section(
    out: &mut String,
    title: &str,
    messages: &[MessageRef],
    db: &Database,
) -> fmt::Result {
    section_start(out, title)?;
    if messages.is_empty() {
        empty(out, &format!("No {}", title.to_lowercase()))?;
    } else {
        table_head(
            out,
            &["Msg ID", "Msg Name", "DLC", "Transmitter", "Cycle Time", "Send Type", "Signals"],
        )?;
        for (i, message_ref) in messages.iter().enumerate() {
            row_open(out, i);
            td(out, &message_ref.id_hex(), false)?;
            td(out, &message_ref.name, false)?;
            if let Some(message) = db.message(message_ref.id) {
                let signals: Vec<&str> = message.signal_names().collect();
                td(out, &message.dlc.to_string(), false)?;
                td(out, &message.transmitter, false)?;
                td(out, &message.attribute("GenMsgCycleTime").to_string(), false)?;
                td(out, &message.attribute("GenMsgSendType").to_string(), false)?;
                td(out, &signals.join(", "), false)?;
            }
            out.push_str("</tr>\n");
        }
        table_end(out);
    }
    section_end(out);
    Ok(())
}

fn signal_section(out: &mut String, title: &str, signals: &[SignalRef]) -> fmt::Result {
    section_start(out, title)?;
    if signals.is_empty() {
        empty(out, &format!("No {}", title.to_lowercase()))?;
    } else {
        table_head(out, &["Msg ID", "Msg Name", "Signal"])?;
        for (i, signal) in signals.iter().enumerate() {
            row_open(out, i);
            td(out, &signal.message.id_hex(), false)?;
            td(out, &signal.message.name, false)?;
            td(out, &signal.name, false)?;
            out.push_str("</tr>\n");
        }
        table_end(out);
    }
    section_end(out);
    Ok(())
}

fn change_rows<F: Display>(
    out: &mut String,
    index: usize,
    prefix: &[String],
    changes: &[FieldChange<F>],
) -> fmt::Result {
    for change in changes {
        row_open(out, index);
        for text in prefix {
            td(out, text, false)?;
        }
        td(out, &change.field.to_string(), false)?;
        td(out, &cell(&change.old), true)?;
        td(out, &cell(&change.new), true)?;
        out.push_str("</tr>\n");
    }
    Ok(())
}

fn full_comparison(out: &mut String, ctx: &ReportContext<'_>, rows: &[FullRow]) -> fmt::Result {
    section_start(out, "Full Comparison")?;
    if rows.is_empty() {
        empty(out, "No messages")?;
        section_end(out);
        return Ok(());
    }

    let mut headers = vec!["Version".to_string()];
    headers.extend(Column::all().map(|c| c.to_string()));
    table_head(out, &headers)?;

    for row in rows {
        side_row(out, ctx.old_label, row.old.as_ref(), row)?;
        side_row(out, ctx.new_label, row.new.as_ref(), row)?;
    }
    table_end(out);
    section_end(out);
    Ok(())
}

fn side_row(out: &mut String, label: &str, side: Option<&RowSide>, row: &FullRow) -> fmt::Result {
    out.push_str(if row.differs { "<tr class=\"context\">" } else { "<tr>" });
    td(out, label, false)?;
    let changed: &BTreeSet<Column> = &row.changed_columns;
    for column in Column::all() {
        let text = side.map(|s| s.value(column).to_string()).unwrap_or_default();
        td(out, &text, changed.contains(&column))?;
    }
    out.push_str("</tr>\n");
    Ok(())
}
