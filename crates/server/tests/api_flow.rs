//! End-to-end API flows through the full app router.
//!
//! A fake device is registered straight into the connection registry, so
//! these tests see exactly what a connected device would receive.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use iot_panel_db::Database;
use iot_panel_server::{create_app, AppState, Config};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

struct Harness {
    state: Arc<AppState>,
    app: Router,
}

impl Harness {
    async fn new() -> Self {
        let db = Database::new_in_memory()
            .await
            .expect("in-memory DB for tests");
        let state = AppState::new(db, &Config::default());
        let app = create_app(state.clone());
        Self { state, app }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec(), content_type)
    }

    async fn json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body, _) = self.send(req).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Register `username` and return a bearer token for it.
    async fn login(&self, username: &str) -> String {
        let (status, _) = self
            .json(post_json(
                "/api/auth/register",
                None,
                json!({
                    "name": "Operator",
                    "username": username,
                    "password": "pw123",
                    "email": format!("{username}@example.com"),
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .json(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!("username={username}&password=pw123")))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    with_json("POST", uri, token, body)
}

fn with_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn parse(text: String) -> Value {
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_action_lifecycle_reaches_device() {
    let h = Harness::new().await;
    let token = h.login("op").await;

    let (status, device) = h
        .json(post_json(
            "/api/devices",
            Some(&token),
            json!({ "name": "Rover", "status": "online" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(device["connected"], false);
    assert!(device["connected_for_secs"].is_null());
    let device_id = device["id"].as_i64().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.state.registry.register(device_id, tx);

    let (status, device) = h
        .json(get(&format!("/api/devices/{device_id}"), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(device["connected"], true);
    assert_eq!(device["connected_for_secs"], 0);

    // Create: persisted and pushed to the device.
    let (status, action) = h
        .json(post_json(
            "/api/actions",
            Some(&token),
            json!({ "id_device": device_id, "action": "MOTOR_IZQ" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(action["executed"], false);
    let action_id = action["id"].as_i64().unwrap();

    let execute = parse(rx.try_recv().unwrap());
    assert_eq!(execute["type"], "action_execute");
    assert_eq!(execute["action_id"], action_id);
    assert_eq!(execute["action_type"], "MOTOR_IZQ");

    // Device-side confirmation needs no token and is announced to everyone.
    let (status, body) = h
        .json(
            Request::builder()
                .method("POST")
                .uri(format!("/api/actions/device/confirm/{action_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["action"]["executed"], true);

    let confirmed = parse(rx.try_recv().unwrap());
    assert_eq!(confirmed["event"], "action_confirmed");
    assert_eq!(confirmed["status"], "executed");

    // Update back to pending: the device hears about it.
    let (status, _) = h
        .json(with_json(
            "PUT",
            &format!("/api/actions/{action_id}"),
            Some(&token),
            json!({ "executed": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let updated = parse(rx.try_recv().unwrap());
    assert_eq!(updated["event"], "action_updated");
    assert_eq!(updated["status"], "pending");

    // Create, confirm and update each wrote a log row.
    let (status, logs) = h
        .json(get(&format!("/api/logs?id_device={device_id}"), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["total"], 3);
    assert_eq!(logs["page"], 1);
}

#[tokio::test]
async fn test_action_for_offline_device_still_persists() {
    let h = Harness::new().await;
    let token = h.login("op").await;
    let (_, device) = h
        .json(post_json(
            "/api/devices",
            Some(&token),
            json!({ "name": "Sleeper" }),
        ))
        .await;
    assert_eq!(device["status"], "offline");

    let (status, action) = h
        .json(post_json(
            "/api/actions",
            Some(&token),
            json!({ "id_device": device["id"], "action": "LED_ON" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, fetched) = h
        .json(get(&format!("/api/actions/{}", action["id"]), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["action"], "LED_ON");
}

#[tokio::test]
async fn test_action_for_unknown_device_is_404() {
    let h = Harness::new().await;
    let token = h.login("op").await;
    let (status, body) = h
        .json(post_json(
            "/api/actions",
            Some(&token),
            json!({ "id_device": 404, "action": "LED_ON" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_device_validation() {
    let h = Harness::new().await;
    let token = h.login("op").await;

    let (status, _) = h
        .json(post_json(
            "/api/devices",
            Some(&token),
            json!({ "name": "Rover", "status": "exploded" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .json(post_json(
            "/api/devices",
            Some(&token),
            json!({ "name": "Rover", "direction": "999.1.1.1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .json(post_json("/api/devices", Some(&token), json!({ "name": "Rover" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = h
        .json(post_json("/api/devices", Some(&token), json!({ "name": "Rover" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.json(get("/api/devices/0", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_invalidates_bearer() {
    let h = Harness::new().await;
    let token = h.login("op").await;

    let (status, _) = h.json(get("/api/users", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .json(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.json(get("/api/users", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reports_and_export() {
    let h = Harness::new().await;
    let token = h.login("op").await;
    let (_, device) = h
        .json(post_json("/api/devices", Some(&token), json!({ "name": "Rover" })))
        .await;
    for action in ["MOTOR_IZQ", "MOTOR_IZQ", "LED_ON"] {
        h.json(post_json(
            "/api/actions",
            Some(&token),
            json!({ "id_device": device["id"], "action": action }),
        ))
        .await;
    }

    let (status, stats) = h
        .json(get("/api/reports/actions/stats", &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_actions"], 3);
    assert_eq!(stats["pending"], 3);
    assert_eq!(stats["action_counts"]["MOTOR_IZQ"], 2);
    assert_eq!(stats["period"], "all time");

    let (status, report) = h
        .json(get("/api/reports/logs?limit=2", &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total"], 3);
    assert_eq!(report["pages"], 2);
    assert_eq!(report["logs"].as_array().unwrap().len(), 2);
    assert_eq!(report["logs"][0]["event_category"], "action");
    assert_eq!(report["logs"][0]["username"], "op");

    let (status, body, content_type) = h
        .send(get("/api/reports/logs/export?format=csv", &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/csv"));
    let csv = String::from_utf8(body).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("MOTOR_IZQ"));

    let (status, _) = h
        .json(get("/api/reports/logs?start_date=yesterday", &token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_huge_page_is_rejected() {
    let h = Harness::new().await;
    let token = h.login("op").await;

    for uri in [
        "/api/logs?page=9223372036854775807&limit=100",
        "/api/reports/logs?page=9223372036854775807&limit=100",
    ] {
        let (status, body) = h.json(get(uri, &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Bad request");
    }

    // A far page whose offset still fits is accepted and simply empty.
    let (status, body) = h
        .json(get("/api/logs?page=1000000&limit=100", &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}
