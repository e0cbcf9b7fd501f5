//! Device CRUD. Every route requires a valid bearer token.

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use iot_panel_db::{DeviceChanges, DeviceFilter, DeviceRow, NewDevice};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{page_size, require_positive_id};
use crate::state::AppState;

pub const ALLOWED_STATUSES: &[&str] = &["online", "offline", "activo", "desconectado", "mantenimiento"];

const MAX_NAME_SEARCH: usize = 50;
const MAX_NAME_LEN: usize = 100;

/// A device plus whether it currently holds a live socket, and for how long.
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    #[serde(flatten)]
    pub device: DeviceRow,
    pub connected: bool,
    pub connected_for_secs: Option<u64>,
}

impl DeviceResponse {
    fn new(device: DeviceRow, state: &AppState) -> Self {
        let connected_for_secs = state.registry.connected_for_secs(device.id);
        Self {
            device,
            connected: connected_for_secs.is_some(),
            connected_for_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDevice {
    pub name: String,
    pub status: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateDevice {
    pub name: Option<String>,
    pub status: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIp {
    pub ip_address: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeviceQuery {
    pub status: Option<String>,
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn validate_status(status: &str) -> ApiResult<()> {
    if !ALLOWED_STATUSES.contains(&status) {
        return Err(ApiError::BadRequest(format!(
            "invalid status '{status}', allowed: {}",
            ALLOWED_STATUSES.join(", ")
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "device name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_ip(ip: &str) -> ApiResult<()> {
    ip.parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest(format!("invalid IPv4 address: {ip}")))
}

async fn ensure_name_free(state: &AppState, name: &str) -> ApiResult<()> {
    if state.db.get_device_by_name(name).await?.is_some() {
        return Err(ApiError::BadRequest(format!(
            "a device named '{name}' already exists"
        )));
    }
    Ok(())
}

async fn load_device(state: &AppState, id: i64) -> ApiResult<DeviceRow> {
    require_positive_id(id, "device")?;
    state
        .db
        .get_device(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {id}")))
}

/// POST /api/devices
pub async fn create_device(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateDevice>,
) -> ApiResult<(StatusCode, Json<DeviceResponse>)> {
    validate_name(&body.name)?;
    if let Some(status) = &body.status {
        validate_status(status)?;
    }
    if let Some(ip) = &body.direction {
        validate_ip(ip)?;
    }
    ensure_name_free(&state, &body.name).await?;

    let row = state
        .db
        .insert_device(&NewDevice {
            name: body.name,
            status: body.status.unwrap_or_else(|| "offline".to_string()),
            direction: body.direction,
        })
        .await?;
    info!(device_id = row.id, name = %row.name, by = %auth.user.username, "device created");
    Ok((StatusCode::CREATED, Json(DeviceResponse::new(row, &state))))
}

/// GET /api/devices?status=&name=&limit=&offset=
pub async fn list_devices(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeviceQuery>,
) -> ApiResult<Json<Vec<DeviceResponse>>> {
    if let Some(status) = &query.status {
        validate_status(status)?;
    }
    if let Some(name) = &query.name {
        if name.chars().count() > MAX_NAME_SEARCH {
            return Err(ApiError::BadRequest("name search is too long".into()));
        }
    }

    let filter = DeviceFilter {
        status: query.status,
        name: query.name,
        limit: page_size(query.limit, 20),
        offset: query.offset.unwrap_or(0).max(0),
    };
    let rows = state.db.list_devices(&filter).await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| DeviceResponse::new(row, &state))
            .collect(),
    ))
}

/// GET /api/devices/{id}
pub async fn get_device(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeviceResponse>> {
    let row = load_device(&state, id).await?;
    Ok(Json(DeviceResponse::new(row, &state)))
}

/// PUT /api/devices/{id} - partial update
pub async fn update_device(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDevice>,
) -> ApiResult<Json<DeviceResponse>> {
    let current = load_device(&state, id).await?;
    if let Some(name) = &body.name {
        validate_name(name)?;
        if *name != current.name {
            ensure_name_free(&state, name).await?;
        }
    }
    if let Some(status) = &body.status {
        validate_status(status)?;
    }
    if let Some(ip) = &body.direction {
        validate_ip(ip)?;
    }

    let changes = DeviceChanges {
        name: body.name,
        status: body.status,
        direction: body.direction,
    };
    let row = state
        .db
        .update_device(id, &changes)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {id}")))?;
    info!(device_id = id, by = %auth.user.username, "device updated");
    Ok(Json(DeviceResponse::new(row, &state)))
}

/// PATCH /api/devices/{id}/ip - record the device address and mark it online
pub async fn update_device_ip(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateIp>,
) -> ApiResult<Json<DeviceResponse>> {
    load_device(&state, id).await?;
    validate_ip(&body.ip_address)?;
    let row = state
        .db
        .set_device_ip(id, &body.ip_address)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {id}")))?;
    info!(device_id = id, ip = %body.ip_address, by = %auth.user.username, "device address updated");
    Ok(Json(DeviceResponse::new(row, &state)))
}

/// DELETE /api/devices/{id} - removes its actions and logs too
pub async fn delete_device(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let row = load_device(&state, id).await?;
    state.db.delete_device(id).await?;
    info!(device_id = id, name = %row.name, by = %auth.user.username, "device deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/devices", get(list_devices).post(create_device))
        .route(
            "/devices/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/devices/{id}/ip", patch(update_device_ip))
}
