//! Paginated activity log.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use iot_panel_db::{LogFilter, LogPage};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{page_offset, parse_date, MAX_PAGE_SIZE};
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct LogQuery {
    pub id_device: Option<i64>,
    pub id_action: Option<i64>,
    pub event: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl LogQuery {
    fn into_filter(self) -> ApiResult<LogFilter> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::BadRequest("page must be at least 1".into()));
        }
        let limit = self.limit.unwrap_or(10);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        page_offset(page, limit)?;
        Ok(LogFilter {
            id_device: self.id_device,
            id_action: self.id_action,
            event: self.event,
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
            page,
            limit,
        })
    }
}

/// GET /api/logs
pub async fn list_logs(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<LogPage>> {
    let filter = query.into_filter()?;
    Ok(Json(state.db.list_logs(&filter).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/logs", get(list_logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let filter = LogQuery::default().into_filter().unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 10);
        assert!(filter.start.is_none());
    }

    #[test]
    fn test_bounds() {
        let bad_page = LogQuery {
            page: Some(0),
            ..Default::default()
        };
        assert!(matches!(bad_page.into_filter(), Err(ApiError::BadRequest(_))));

        let bad_limit = LogQuery {
            limit: Some(101),
            ..Default::default()
        };
        assert!(bad_limit.into_filter().is_err());
    }

    #[test]
    fn test_date_range() {
        let filter = LogQuery {
            start_date: Some("2025-01-01".into()),
            end_date: Some("2025-01-31".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert!(filter.start.unwrap() < filter.end.unwrap());

        let bad = LogQuery {
            start_date: Some("01/01/2025".into()),
            ..Default::default()
        };
        assert!(bad.into_filter().is_err());
    }
}
