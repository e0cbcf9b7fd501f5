//! Local-time rendering for human-facing reports.
//!
//! Records are stored in UTC. The panel runs at a fixed UTC-5 offset with no
//! daylight saving.

use chrono::{DateTime, FixedOffset, Offset, Utc};

const PANEL_OFFSET_SECS: i32 = 5 * 3600;

pub fn panel_offset() -> FixedOffset {
    FixedOffset::west_opt(PANEL_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn to_local(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.with_timezone(&panel_offset())
}

/// `2025-01-31 19:05:00`
pub fn format_local(ts: DateTime<Utc>) -> String {
    to_local(ts).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `31/01/2025 07:05:00 PM`
pub fn format_display(ts: DateTime<Utc>) -> String {
    to_local(ts).format("%d/%m/%Y %I:%M:%S %p").to_string()
}
