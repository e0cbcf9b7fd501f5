//! API route handlers for the IoT panel server.

pub mod actions;
pub mod auth;
pub mod devices;
pub mod health;
pub mod logs;
pub mod reports;
pub mod users;

use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::time::panel_offset;

/// Largest page any list endpoint returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/auth/register | login | logout
/// - GET  /api/users, GET|PUT|DELETE /api/users/{id}
/// - POST|GET /api/devices, GET|PUT|DELETE /api/devices/{id}, PATCH /api/devices/{id}/ip
/// - POST|GET /api/actions, GET|PUT|DELETE /api/actions/{id}
/// - POST /api/actions/device/confirm/{id} - Device-side confirmation (no auth)
/// - GET  /api/logs - Paginated activity log
/// - GET  /api/reports/actions/stats | logs | logs/export
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::welcome))
        .nest("/api", health::router())
        .nest("/api", auth::router())
        .nest("/api", users::router())
        .nest("/api", devices::router())
        .nest("/api", actions::router())
        .nest("/api", logs::router())
        .nest("/api", reports::router())
        .with_state(state)
}

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub(crate) fn page_size(requested: Option<i64>, default: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

/// Row offset of a 1-based page, rejecting pages whose offset overflows.
pub(crate) fn page_offset(page: i64, limit: i64) -> ApiResult<i64> {
    page.checked_sub(1)
        .and_then(|skipped| skipped.checked_mul(limit))
        .ok_or_else(|| ApiError::BadRequest(format!("page {page} is out of range")))
}

pub(crate) fn require_positive_id(id: i64, what: &str) -> ApiResult<()> {
    if id <= 0 {
        return Err(ApiError::BadRequest(format!("invalid {what} id: {id}")));
    }
    Ok(())
}

/// Parse a date filter. Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`
/// in panel local time, or a bare `YYYY-MM-DD` which expands to the start
/// (or end, when `end_of_day`) of that local day.
pub(crate) fn parse_date(raw: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        Some(ts)
    } else if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if end_of_day {
            day.and_hms_opt(23, 59, 59)
        } else {
            day.and_hms_opt(0, 0, 0)
        }
    } else {
        None
    };
    naive
        .and_then(|n| panel_offset().from_local_datetime(&n).single())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| ApiError::BadRequest(format!("invalid date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_clamps() {
        assert_eq!(page_size(None, 20), 20);
        assert_eq!(page_size(Some(500), 20), 100);
        assert_eq!(page_size(Some(0), 20), 1);
        assert_eq!(page_size(Some(-3), 20), 1);
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 50).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 40);
        assert!(matches!(
            page_offset(i64::MAX, 100),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_require_positive_id() {
        assert!(require_positive_id(1, "device").is_ok());
        assert!(matches!(
            require_positive_id(0, "device"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(require_positive_id(-4, "device").is_err());
    }

    #[test]
    fn test_parse_date_forms() {
        let rfc = parse_date("2025-03-01T10:00:00Z", false).unwrap();
        assert_eq!(rfc.to_rfc3339(), "2025-03-01T10:00:00+00:00");

        // Local midnight is 05:00 UTC.
        let start = parse_date("2025-03-01", false).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-03-01T05:00:00+00:00");

        let end = parse_date("2025-03-01", true).unwrap();
        assert_eq!(end.to_rfc3339(), "2025-03-02T04:59:59+00:00");

        let naive = parse_date("2025-03-01T08:30:00", false).unwrap();
        assert_eq!(naive.to_rfc3339(), "2025-03-01T13:30:00+00:00");

        assert!(matches!(
            parse_date("yesterday", false),
            Err(ApiError::BadRequest(_))
        ));
    }
}
