//! Activity reports: action statistics, detailed logs and exports.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use iot_panel_db::{ActionStats, LogReportRow, ReportFilter};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::report::{render, ReportFormat, ReportMeta};
use crate::routes::{page_offset, parse_date, MAX_PAGE_SIZE};
use crate::state::AppState;
use crate::time::format_local;

/// Upper bound on rows in one export.
const MAX_EXPORT_ROWS: i64 = 5000;

#[derive(Debug, Deserialize, Default)]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub device_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub format: Option<ReportFormat>,
}

impl ReportQuery {
    fn filter(&self) -> ApiResult<ReportFilter> {
        Ok(ReportFilter {
            start: self
                .start_date
                .as_deref()
                .map(|d| parse_date(d, false))
                .transpose()?,
            end: self
                .end_date
                .as_deref()
                .map(|d| parse_date(d, true))
                .transpose()?,
            device_id: self.device_id,
            user_id: self.user_id,
            action_type: self.action_type.clone(),
        })
    }

    /// Applied filters as `(label, value)` pairs, for echoing back.
    fn applied(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(v) = &self.start_date {
            out.push(("start_date".to_string(), v.clone()));
        }
        if let Some(v) = &self.end_date {
            out.push(("end_date".to_string(), v.clone()));
        }
        if let Some(v) = self.device_id {
            out.push(("device_id".to_string(), v.to_string()));
        }
        if let Some(v) = self.user_id {
            out.push(("user_id".to_string(), v.to_string()));
        }
        if let Some(v) = &self.action_type {
            out.push(("action_type".to_string(), v.clone()));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct ActionStatsResponse {
    #[serde(flatten)]
    pub stats: ActionStats,
    pub period: String,
    pub device_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub row: LogReportRow,
    pub event_category: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LogsReportResponse {
    pub logs: Vec<LogEntry>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
    pub filters: BTreeMap<String, String>,
}

fn describe_period(filter: &ReportFilter) -> String {
    match (filter.start, filter.end) {
        (None, None) => "all time".to_string(),
        (Some(start), None) => format!("since {}", format_local(start)),
        (None, Some(end)) => format!("until {}", format_local(end)),
        (Some(start), Some(end)) => {
            format!("{} to {}", format_local(start), format_local(end))
        }
    }
}

/// GET /api/reports/actions/stats
pub async fn action_stats(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<ActionStatsResponse>> {
    let filter = query.filter()?;
    let stats = state.db.action_stats(&filter).await?;
    Ok(Json(ActionStatsResponse {
        stats,
        period: describe_period(&filter),
        device_id: filter.device_id,
    }))
}

/// GET /api/reports/logs
pub async fn logs_report(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<LogsReportResponse>> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50);
    if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "page must be >= 1 and limit between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let offset = page_offset(page, limit)?;
    let filter = query.filter()?;
    let (rows, total) = state.db.log_report(&filter, limit, offset).await?;

    Ok(Json(LogsReportResponse {
        logs: rows
            .into_iter()
            .map(|row| LogEntry {
                event_category: row.event_category(),
                row,
            })
            .collect(),
        total,
        page,
        limit,
        pages: ((total + limit - 1) / limit).max(1),
        filters: query.applied().into_iter().collect(),
    }))
}

/// GET /api/reports/logs/export?format=text|csv
pub async fn export_logs(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    let format = query.format.unwrap_or_default();
    let limit = query.limit.unwrap_or(1000).clamp(1, MAX_EXPORT_ROWS);
    let filter = query.filter()?;
    let (rows, total) = state.db.log_report(&filter, limit, 0).await?;

    let generated_at = Utc::now();
    let body = render(
        format,
        &rows,
        &ReportMeta {
            generated_at,
            filters: query.applied(),
            total,
        },
    );
    let disposition = format!(
        "attachment; filename=\"logs_report_{}.{}\"",
        generated_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reports/actions/stats", get(action_stats))
        .route("/reports/logs", get(logs_report))
        .route("/reports/logs/export", get(export_logs))
}
