// crates/server/src/lib.rs
//! IoT control panel server library.
//!
//! Serves the REST API for users, devices, actions, logs and reports, and
//! the `/ws/device/{id}` sockets devices stay connected on.

pub mod auth;
pub mod config;
pub mod device_events;
pub mod error;
pub mod report;
pub mod routes;
pub mod state;
pub mod time;

pub use config::{Cli, Command, Config};
pub use device_events::DeviceEvents;
pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use iot_panel_relay::DeviceHub;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// REST routes live under `/api`, device sockets under `/ws/device/{id}`.
/// CORS is wide open because panels are served from other origins.
pub fn create_app(state: Arc<AppState>) -> Router {
    let hub = DeviceHub::new(
        state.registry.clone(),
        Arc::new(DeviceEvents::new(state.clone())),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .merge(iot_panel_relay::router(hub))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use iot_panel_db::Database;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let db = Database::new_in_memory().await.unwrap();
        create_app(AppState::new(db, &Config::default()))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = get(test_app().await, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], "connected");
        assert_eq!(json["connected_devices"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn test_welcome() {
        let (status, body) = get(test_app().await, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("message"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _) = get(test_app().await, "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let (status, body) = get(test_app().await, "/api/devices").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let response = test_app()
            .await
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/devices")
                    .header(header::ORIGIN, "http://panel.local")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }
}
