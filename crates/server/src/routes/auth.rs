//! Registration, login and logout.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use iot_panel_db::{NewUser, UserRow};
use iot_panel_relay::LoginUser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{bearer_token, hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub status: bool,
}

fn default_true() -> bool {
    true
}

/// OAuth2 password-grant style form body.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: LoginUser,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogoutQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

pub(crate) fn validate_username(username: &str) -> ApiResult<()> {
    if username.trim().is_empty() || username.len() > 50 {
        return Err(ApiError::BadRequest(
            "username must be 1 to 50 characters".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> ApiResult<()> {
    if !email.contains('@') || email.len() > 100 {
        return Err(ApiError::BadRequest(format!("invalid email: {email}")));
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserRow>)> {
    validate_username(&body.username)?;
    validate_email(&body.email)?;
    if body.password.is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".into()));
    }
    if state.db.username_taken(&body.username, None).await? {
        return Err(ApiError::BadRequest(format!(
            "user {} already exists",
            body.username
        )));
    }

    let user = state
        .db
        .insert_user(&NewUser {
            name: body.name,
            username: body.username,
            password_hash: hash_password(&body.password)?,
            email: body.email,
            status: body.status,
        })
        .await?;
    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/login
///
/// Issues a token, records it as active, then notifies the control device.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .db
        .get_user_by_username(&form.username)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user not found".into()))?;
    if !verify_password(&form.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("wrong password".into()));
    }

    let issued = state.keys.issue(&user)?;
    state
        .db
        .insert_token(user.id, &issued.token, issued.issued_at, issued.expires_at)
        .await?;
    state.db.touch_last_connection(user.id).await?;

    let login_user = LoginUser {
        id: user.id,
        username: user.username.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
    };
    let _ = state
        .dispatcher
        .user_logged_in(&issued.token, login_user.clone());

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".into(),
        access_token: issued.token,
        token_type: "bearer".into(),
        expires_at: issued.expires_at,
        user: login_user,
    }))
}

/// POST /api/auth/logout?token=... (or with a bearer header)
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogoutQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let token = query
        .token
        .or_else(|| bearer_token(&headers).map(str::to_string))
        .ok_or_else(|| ApiError::BadRequest("no token supplied".into()))?;

    if !state.db.deactivate_token(&token).await? {
        return Err(ApiError::NotFound("token not found or already revoked".into()));
    }
    Ok(Json(MessageResponse {
        success: true,
        message: "Session closed".into(),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{header, Request};
    use iot_panel_db::Database;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let db = Database::new_in_memory().await.unwrap();
        AppState::new(db, &Config::default())
    }

    fn app(state: Arc<AppState>) -> Router {
        router().with_state(state)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    fn register_req(username: &str) -> Request<Body> {
        let body = serde_json::json!({
            "name": "Operator",
            "username": username,
            "password": "pw123",
            "email": format!("{username}@example.com"),
        });
        Request::builder()
            .method("POST")
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn login_req(username: &str, password: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let state = test_state().await;
        let (status, body) = send(app(state.clone()), register_req("op")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "op");
        assert!(body.get("password_hash").is_none());

        let (status, _) = send(app(state), register_req("op")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_reusing_deleted_username() {
        let state = test_state().await;
        let (status, body) = send(app(state.clone()), register_req("op")).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_i64().unwrap();
        assert!(state.db.delete_user(id).await.unwrap());

        let (status, body) = send(app(state), register_req("op")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request");
    }

    #[tokio::test]
    async fn test_login_persists_token_and_notifies_control_device() {
        let state = test_state().await;
        send(app(state.clone()), register_req("op")).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        state.registry.register(1, tx);

        let (status, body) = send(app(state.clone()), login_req("op", "pw123")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        assert!(state.db.get_active_token(&token).await.unwrap().is_some());
        let user = state.db.get_user_by_username("op").await.unwrap().unwrap();
        assert!(user.last_connection.is_some());

        let note: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(note["type"], "login");
        assert_eq!(note["token"], token.as_str());
        assert_eq!(note["user"]["username"], "op");
    }

    #[tokio::test]
    async fn test_login_falls_back_to_broadcast() {
        let state = test_state().await;
        send(app(state.clone()), register_req("op")).await;

        // Control device 1 is offline; device 5 still hears about the login.
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.registry.register(5, tx);

        let (status, _) = send(app(state.clone()), login_req("op", "pw123")).await;
        assert_eq!(status, StatusCode::OK);
        let note: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(note["type"], "login");
        assert!(note.get("user").is_none());
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let state = test_state().await;
        send(app(state.clone()), register_req("op")).await;

        let (status, _) = send(app(state.clone()), login_req("op", "wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(app(state), login_req("ghost", "pw123")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_once() {
        let state = test_state().await;
        send(app(state.clone()), register_req("op")).await;
        let (_, body) = send(app(state.clone()), login_req("op", "pw123")).await;
        let token = body["access_token"].as_str().unwrap().to_string();

        let logout = |token: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/auth/logout?token={token}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = send(app(state.clone()), logout(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = send(app(state.clone()), logout(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(state.db.get_active_token(&token).await.unwrap().is_none());
    }

    #[test]
    fn test_field_validation() {
        assert!(validate_username("op").is_ok());
        assert!(validate_username("  ").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
        assert!(validate_email("op@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
    }
}
