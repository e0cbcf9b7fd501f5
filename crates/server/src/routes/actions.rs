//! Device actions: persistence first, then a best-effort device notification.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use iot_panel_db::{ActionFilter, ActionRow, NewLog};
use iot_panel_relay::ActionNotice;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{page_size, require_positive_id};
use crate::state::AppState;

const MAX_ACTION_LEN: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateAction {
    pub id_device: i64,
    pub action: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateAction {
    pub executed: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ActionQuery {
    pub id_device: Option<i64>,
    pub executed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub action: ActionRow,
}

pub(crate) fn notice(action: &ActionRow) -> ActionNotice {
    ActionNotice {
        action_id: action.id,
        id_device: action.id_device,
        action_type: action.action.clone(),
        executed: action.executed,
        created_at: action.created_at,
    }
}

/// Mark an action executed on behalf of its device, log it without a user
/// and announce it to every connected device.
pub(crate) async fn record_confirmation(state: &AppState, action_id: i64) -> ApiResult<ActionRow> {
    let action = state
        .db
        .set_action_executed(action_id, true)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("action {action_id}")))?;
    state
        .db
        .insert_log(&NewLog {
            event: format!("Device confirmed execution of action '{}'", action.action),
            id_device: action.id_device,
            id_user: None,
            id_action: Some(action.id),
        })
        .await?;
    state.dispatcher.action_confirmed(&notice(&action));
    info!(action_id, device_id = action.id_device, "action confirmed by device");
    Ok(action)
}

async fn load_action(state: &AppState, id: i64) -> ApiResult<ActionRow> {
    require_positive_id(id, "action")?;
    state
        .db
        .get_action(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("action {id}")))
}

/// POST /api/actions - queue a command and push it to the device
pub async fn create_action(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAction>,
) -> ApiResult<(StatusCode, Json<ActionRow>)> {
    let command = body.action.trim();
    if command.is_empty() || command.chars().count() > MAX_ACTION_LEN {
        return Err(ApiError::BadRequest(format!(
            "action must be 1 to {MAX_ACTION_LEN} characters"
        )));
    }
    require_positive_id(body.id_device, "device")?;
    if state.db.get_device(body.id_device).await?.is_none() {
        return Err(ApiError::NotFound(format!("device {}", body.id_device)));
    }

    let action = state.db.insert_action(body.id_device, command).await?;
    let _ = state.dispatcher.action_created(&notice(&action));

    state
        .db
        .insert_log(&NewLog {
            event: format!(
                "Action '{}' created for device {}",
                action.action, action.id_device
            ),
            id_device: action.id_device,
            id_user: Some(auth.user.id),
            id_action: Some(action.id),
        })
        .await?;

    info!(action_id = action.id, device_id = action.id_device, by = %auth.user.username, "action created");
    Ok((StatusCode::CREATED, Json(action)))
}

/// GET /api/actions?id_device=&executed=&limit=&offset=
pub async fn list_actions(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<Vec<ActionRow>>> {
    let filter = ActionFilter {
        id_device: query.id_device,
        executed: query.executed,
        limit: page_size(query.limit, 20),
        offset: query.offset.unwrap_or(0).max(0),
    };
    Ok(Json(state.db.list_actions(&filter).await?))
}

/// GET /api/actions/{id}
pub async fn get_action(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActionRow>> {
    Ok(Json(load_action(&state, id).await?))
}

/// PUT /api/actions/{id} - set the executed flag and tell the device
pub async fn update_action(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAction>,
) -> ApiResult<Json<ActionRow>> {
    let mut action = load_action(&state, id).await?;
    if let Some(executed) = body.executed {
        action = state
            .db
            .set_action_executed(id, executed)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("action {id}")))?;
    }

    let event = if action.executed {
        "Action executed"
    } else {
        "Action marked as not executed"
    };
    state
        .db
        .insert_log(&NewLog {
            event: event.to_string(),
            id_device: action.id_device,
            id_user: Some(auth.user.id),
            id_action: Some(action.id),
        })
        .await?;

    let _ = state.dispatcher.action_updated(&notice(&action));
    Ok(Json(action))
}

/// DELETE /api/actions/{id}
pub async fn delete_action(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    load_action(&state, id).await?;
    state.db.delete_action(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/actions/device/confirm/{id} - called by the device itself, no token
pub async fn confirm_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ConfirmResponse>> {
    require_positive_id(id, "action")?;
    let action = record_confirmation(&state, id).await?;
    Ok(Json(ConfirmResponse {
        success: true,
        message: "Action confirmed".into(),
        action,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/actions", get(list_actions).post(create_action))
        .route(
            "/actions/{id}",
            get(get_action).put(update_action).delete(delete_action),
        )
        .route("/actions/device/confirm/{id}", post(confirm_action))
}
