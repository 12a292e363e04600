//! Trình bày kết quả dạng bảng văn bản.

use std::fmt::Write;

use census_core::{drilldown_query, ConditionOverview, DrilldownOutcome};

pub const NO_DATA_MESSAGE: &str = "No data found.";

/// Bảng xếp hạng chẩn đoán kèm liên kết sang trang chi tiết.
pub fn render_overview(overview: &ConditionOverview) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Top {} conditions ({} records scanned, {} distinct)",
        overview.conditions.len(),
        overview.records_scanned,
        overview.distinct_conditions
    );

    if overview.conditions.is_empty() {
        out.push_str(NO_DATA_MESSAGE);
        out.push('\n');
        return out;
    }

    let rows: Vec<[String; 5]> = overview
        .conditions
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            [
                (idx + 1).to_string(),
                entry.name.clone(),
                entry.count.to_string(),
                entry.details.subject.clone().unwrap_or_else(|| "-".to_string()),
                entry.details.encounter.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let header = ["#", "Condition", "Patients", "Subject", "Encounter"].map(str::to_string);
    write_table(&mut out, &header, &rows);

    out.push('\n');
    for entry in &overview.conditions {
        if let Ok(query) = drilldown_query(&entry.name) {
            let _ = writeln!(out, "{}: ?{query}", entry.name);
        }
    }

    out
}

/// Bảng Gender / Admission Class / Number of Patients, hoặc thông báo rỗng.
pub fn render_outcome(outcome: &DrilldownOutcome) -> String {
    let breakdown = match outcome {
        DrilldownOutcome::NoData { .. } => return format!("{NO_DATA_MESSAGE}\n"),
        DrilldownOutcome::Found(breakdown) => breakdown,
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Gender & Admission Class for {}",
        breakdown.condition
    );
    let _ = writeln!(
        out,
        "{} condition records, {} patients, {} encounters",
        breakdown.matched_conditions, breakdown.matched_patients, breakdown.matched_encounters
    );

    let rows: Vec<[String; 3]> = breakdown
        .cross_tab
        .cells()
        .map(|(gender, admission, count)| {
            [gender.to_string(), admission.to_string(), count.to_string()]
        })
        .collect();

    let header = ["Gender", "Admission Class", "Number of Patients"].map(str::to_string);
    write_table(&mut out, &header, &rows);
    out
}

fn write_table<const N: usize>(out: &mut String, header: &[String; N], rows: &[[String; N]]) {
    let mut widths = header.clone().map(|cell| cell.chars().count());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    write_row(out, header, &widths);
    for row in rows {
        write_row(out, row, &widths);
    }
}

fn write_row<const N: usize>(out: &mut String, cells: &[String; N], widths: &[usize; N]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}
