//! Activity log queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::{from_unix, Database, DbResult};

#[derive(Debug, Clone, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub event: String,
    pub id_device: i64,
    /// `None` for events raised by a device rather than a user.
    pub id_user: Option<i64>,
    pub id_action: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for LogRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event: row.try_get("event")?,
            id_device: row.try_get("id_device")?,
            id_user: row.try_get("id_user")?,
            id_action: row.try_get("id_action")?,
            timestamp: from_unix(row.try_get("timestamp")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewLog {
    pub event: String,
    pub id_device: i64,
    pub id_user: Option<i64>,
    pub id_action: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct LogFilter {
    pub id_device: Option<i64>,
    pub id_action: Option<i64>,
    /// Exact event text.
    pub event: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// 1-based.
    pub page: i64,
    pub limit: i64,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            id_device: None,
            id_action: None,
            event: None,
            start: None,
            end: None,
            page: 1,
            limit: 10,
        }
    }
}

/// One page of logs plus overall counters.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
    pub data: Vec<LogRow>,
    pub counts_by_device: BTreeMap<String, i64>,
    pub counts_by_action_type: BTreeMap<String, i64>,
}

/// Number of pages needed for `total` rows, never zero.
pub(crate) fn page_count(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 1;
    }
    ((total + limit - 1) / limit).max(1)
}

fn append_filters<'args>(qb: &mut sqlx::QueryBuilder<'args, sqlx::Sqlite>, filter: &'args LogFilter) {
    qb.push(" WHERE 1=1");
    if let Some(id_device) = filter.id_device {
        qb.push(" AND id_device = ").push_bind(id_device);
    }
    if let Some(id_action) = filter.id_action {
        qb.push(" AND id_action = ").push_bind(id_action);
    }
    if let Some(event) = &filter.event {
        qb.push(" AND event = ").push_bind(event.as_str());
    }
    if let Some(start) = filter.start {
        qb.push(" AND timestamp >= ").push_bind(start.timestamp());
    }
    if let Some(end) = filter.end {
        qb.push(" AND timestamp <= ").push_bind(end.timestamp());
    }
}

impl Database {
    pub async fn insert_log(&self, log: &NewLog) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO logs (event, id_device, id_user, id_action, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&log.event)
        .bind(log.id_device)
        .bind(log.id_user)
        .bind(log.id_action)
        .bind(super::now_secs())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Filtered, paginated logs (newest first) with per-device and
    /// per-action-type counters over the whole table.
    pub async fn list_logs(&self, filter: &LogFilter) -> DbResult<LogPage> {
        let mut count_qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT COUNT(*) FROM logs");
        append_filters(&mut count_qb, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(self.pool()).await?;

        let page = filter.page.max(1);
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, event, id_device, id_user, id_action, timestamp FROM logs",
        );
        append_filters(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind((page - 1).saturating_mul(filter.limit));
        let data = qb.build_query_as::<LogRow>().fetch_all(self.pool()).await?;

        let by_device: Vec<(String, i64)> = sqlx::query_as(
            "SELECT d.name, COUNT(l.id) FROM logs l \
             JOIN devices d ON d.id = l.id_device GROUP BY d.name",
        )
        .fetch_all(self.pool())
        .await?;

        let by_action: Vec<(String, i64)> = sqlx::query_as(
            "SELECT a.action, COUNT(l.id) FROM logs l \
             JOIN actions a ON a.id = l.id_action GROUP BY a.action",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(LogPage {
            total,
            page,
            limit: filter.limit,
            pages: page_count(total, filter.limit),
            data,
            counts_by_device: by_device.into_iter().collect(),
            counts_by_action_type: by_action.into_iter().collect(),
        })
    }
}
