//! User administration. Every route requires a valid bearer token.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use iot_panel_db::{UserChanges, UserRow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{hash_password, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::{validate_email, validate_username};
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    /// Plain text; stored hashed.
    pub password: Option<String>,
    pub email: Option<String>,
    pub status: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
}

/// GET /api/users
pub async fn list_users(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<UserRow>>> {
    Ok(Json(state.db.list_users().await?))
}

/// GET /api/users/{id}
pub async fn get_user(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserRow>> {
    state
        .db
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user {id}")))
}

/// PUT /api/users/{id} - partial update
pub async fn update_user(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UserUpdate>,
) -> ApiResult<Json<UserRow>> {
    if let Some(username) = &body.username {
        validate_username(username)?;
        if state.db.username_taken(username, Some(id)).await? {
            return Err(ApiError::BadRequest(format!("user {username} already exists")));
        }
    }
    if let Some(email) = &body.email {
        validate_email(email)?;
    }
    let password_hash = match body.password.as_deref() {
        Some("") => return Err(ApiError::BadRequest("password must not be empty".into())),
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let changes = UserChanges {
        name: body.name,
        username: body.username,
        password_hash,
        email: body.email,
        status: body.status,
    };
    let user = state
        .db
        .update_user(id, &changes)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {id}")))?;
    info!(user_id = id, by = %auth.user.username, "user updated");
    Ok(Json(user))
}

/// DELETE /api/users/{id} - soft delete, revokes the user's tokens
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeletedResponse>> {
    if !state.db.delete_user(id).await? {
        return Err(ApiError::NotFound(format!("user {id}")));
    }
    info!(user_id = id, by = %auth.user.username, "user deleted");
    Ok(Json(DeletedResponse {
        message: "User deleted".into(),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}
