//! Aggregations behind the activity reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::{from_unix, Database, DbResult};

/// Filters shared by the report queries. `None` means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub device_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action_type: Option<String>,
}

/// Action counts per command name.
#[derive(Debug, Clone, Serialize)]
pub struct ActionStats {
    pub total_actions: i64,
    pub executed: i64,
    pub pending: i64,
    pub action_counts: BTreeMap<String, i64>,
}

/// A log entry joined with its user, device and action.
#[derive(Debug, Clone, Serialize)]
pub struct LogReportRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub action_type: Option<String>,
    pub username: Option<String>,
    pub device_name: String,
    pub id_device: i64,
    pub id_user: Option<i64>,
    pub id_action: Option<i64>,
}

impl LogReportRow {
    /// Coarse grouping used by report readers.
    pub fn event_category(&self) -> &'static str {
        match (&self.action_type, self.id_user) {
            (Some(_), None) => "device",
            (Some(_), Some(_)) => "action",
            (None, _) => "system",
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for LogReportRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            timestamp: from_unix(row.try_get("timestamp")?),
            event: row.try_get("event")?,
            action_type: row.try_get("action_type")?,
            username: row.try_get("username")?,
            device_name: row.try_get("device_name")?,
            id_device: row.try_get("id_device")?,
            id_user: row.try_get("id_user")?,
            id_action: row.try_get("id_action")?,
        })
    }
}

const LOG_REPORT_FROM: &str = " FROM logs l \
     JOIN devices d ON d.id = l.id_device \
     LEFT JOIN users u ON u.id = l.id_user \
     LEFT JOIN actions a ON a.id = l.id_action";

fn append_log_filters<'args>(
    qb: &mut sqlx::QueryBuilder<'args, sqlx::Sqlite>,
    filter: &'args ReportFilter,
) {
    qb.push(" WHERE 1=1");
    if let Some(start) = filter.start {
        qb.push(" AND l.timestamp >= ").push_bind(start.timestamp());
    }
    if let Some(end) = filter.end {
        qb.push(" AND l.timestamp <= ").push_bind(end.timestamp());
    }
    if let Some(device_id) = filter.device_id {
        qb.push(" AND l.id_device = ").push_bind(device_id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND l.id_user = ").push_bind(user_id);
    }
    if let Some(action_type) = &filter.action_type {
        qb.push(" AND a.action = ").push_bind(action_type.as_str());
    }
}

impl Database {
    /// Count actions per command over the filter's period and device.
    pub async fn action_stats(&self, filter: &ReportFilter) -> DbResult<ActionStats> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT action, COUNT(*), SUM(CASE WHEN executed THEN 1 ELSE 0 END) \
             FROM actions WHERE 1=1",
        );
        if let Some(start) = filter.start {
            qb.push(" AND created_at >= ").push_bind(start.timestamp());
        }
        if let Some(end) = filter.end {
            qb.push(" AND created_at <= ").push_bind(end.timestamp());
        }
        if let Some(device_id) = filter.device_id {
            qb.push(" AND id_device = ").push_bind(device_id);
        }
        if let Some(action_type) = &filter.action_type {
            qb.push(" AND action = ").push_bind(action_type.as_str());
        }
        qb.push(" GROUP BY action");

        let rows: Vec<(String, i64, i64)> = qb.build_query_as().fetch_all(self.pool()).await?;

        let mut stats = ActionStats {
            total_actions: 0,
            executed: 0,
            pending: 0,
            action_counts: BTreeMap::new(),
        };
        for (action, count, executed) in rows {
            stats.total_actions += count;
            stats.executed += executed;
            stats.action_counts.insert(action, count);
        }
        stats.pending = stats.total_actions - stats.executed;
        Ok(stats)
    }

    /// Detailed log rows (newest first) and the unpaginated total.
    pub async fn log_report(
        &self,
        filter: &ReportFilter,
        limit: i64,
        offset: i64,
    ) -> DbResult<(Vec<LogReportRow>, i64)> {
        let mut count_qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT COUNT(*){LOG_REPORT_FROM}"
        ));
        append_log_filters(&mut count_qb, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(self.pool()).await?;

        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT l.id, l.timestamp, l.event, a.action AS action_type, u.username, \
             d.name AS device_name, l.id_device, l.id_user, l.id_action{LOG_REPORT_FROM}"
        ));
        append_log_filters(&mut qb, filter);
        qb.push(" ORDER BY l.timestamp DESC, l.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb
            .build_query_as::<LogReportRow>()
            .fetch_all(self.pool())
            .await?;

        Ok((rows, total))
    }
}
