//! Plain-text and CSV rendering of the activity log report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use iot_panel_db::LogReportRow;
use serde::Deserialize;

use crate::time::{format_display, format_local};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Csv,
}

impl ReportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ReportFormat::Text => "text/plain; charset=utf-8",
            ReportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Header information printed above the rows.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub generated_at: DateTime<Utc>,
    /// `(label, value)` pairs for the filters that were applied.
    pub filters: Vec<(String, String)>,
    pub total: i64,
}

pub fn render(format: ReportFormat, rows: &[LogReportRow], meta: &ReportMeta) -> String {
    match format {
        ReportFormat::Text => render_text(rows, meta),
        ReportFormat::Csv => render_csv(rows),
    }
}

pub fn render_text(rows: &[LogReportRow], meta: &ReportMeta) -> String {
    let mut out = String::new();
    out.push_str("IoT Control Panel - Activity Report\n");
    out.push_str(&format!("Generated: {}\n", format_display(meta.generated_at)));
    if meta.filters.is_empty() {
        out.push_str("Filters: none\n");
    } else {
        for (label, value) in &meta.filters {
            out.push_str(&format!("Filter {label}: {value}\n"));
        }
    }
    out.push_str(&format!(
        "Entries: {} shown of {} matching\n",
        rows.len(),
        meta.total
    ));

    let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *categories.entry(row.event_category()).or_default() += 1;
    }
    for (category, count) in &categories {
        out.push_str(&format!("  {category}: {count}\n"));
    }

    out.push('\n');
    if rows.is_empty() {
        out.push_str("No log entries match these filters.\n");
        return out;
    }

    out.push_str("ID     | Date (UTC-5)        | Device               | User         | Action       | Event\n");
    out.push_str(&"-".repeat(100));
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{:<6} | {:<19} | {:<20} | {:<12} | {:<12} | {}\n",
            row.id,
            format_local(row.timestamp),
            truncate(&row.device_name, 20),
            truncate(row.username.as_deref().unwrap_or("device"), 12),
            truncate(row.action_type.as_deref().unwrap_or("-"), 12),
            row.event,
        ));
    }
    out
}

pub fn render_csv(rows: &[LogReportRow]) -> String {
    let mut csv = String::new();
    csv.push_str("id,timestamp_local,category,device_id,device_name,user_id,username,action_id,action_type,event\n");
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            row.id,
            format_local(row.timestamp),
            row.event_category(),
            row.id_device,
            escape_csv_field(&row.device_name),
            row.id_user.map(|id| id.to_string()).unwrap_or_default(),
            escape_csv_field(row.username.as_deref().unwrap_or("")),
            row.id_action.map(|id| id.to_string()).unwrap_or_default(),
            escape_csv_field(row.action_type.as_deref().unwrap_or("")),
            escape_csv_field(&row.event),
        ));
    }
    csv
}

/// Quote a field per RFC 4180 when it holds a delimiter, quote or newline.
fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}~")
    }
}
