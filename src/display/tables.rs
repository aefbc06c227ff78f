//! Table formatting for run summaries.

use crate::analysis::{CheckReport, Severity, ViolationKind};
use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::DarkRed,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Grey,
    }
}

/// Violation counts per kind, most severe first, followed by run totals.
pub fn create_summary_table(report: &CheckReport) -> String {
    let mut table = new_table();

    table.set_header(vec![
        Cell::new("Kind").add_attribute(Attribute::Bold),
        Cell::new("Severity").add_attribute(Attribute::Bold),
        Cell::new("Count").add_attribute(Attribute::Bold),
    ]);

    let mut rows: Vec<(ViolationKind, usize)> = ViolationKind::ALL
        .into_iter()
        .map(|kind| {
            let count = report
                .diagnostics
                .iter()
                .filter(|d| d.violation.kind == kind)
                .count();
            (kind, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();
    rows.sort_by(|a, b| b.0.severity().cmp(&a.0.severity()).then(b.1.cmp(&a.1)));

    for (kind, count) in rows {
        let severity = kind.severity();
        // Plain text cells; comfy-table miscounts ANSI escape widths
        table.add_row(vec![
            Cell::new(kind.as_str()),
            Cell::new(severity.as_str()).fg(severity_color(severity)),
            Cell::new(count),
        ]);
    }

    table.add_row(vec![
        Cell::new("TOTAL").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(report.diagnostics.len()).add_attribute(Attribute::Bold),
    ]);

    let mut totals = format!(
        "{} files, {} functions checked in {}ms",
        report.files_checked, report.functions_checked, report.elapsed_ms
    );
    if !report.failures.is_empty() {
        totals.push_str(&format!(", {} files could not be checked", report.failures.len()));
    }

    format!("{table}\n{totals}")
}
