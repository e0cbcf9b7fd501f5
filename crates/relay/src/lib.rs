//! Device connection registry and command dispatch.
//!
//! Devices hold one WebSocket each. The [`registry::ConnectionRegistry`] maps
//! device ids to the outbound half of those sockets, and the
//! [`dispatch::CommandDispatcher`] turns domain events into the messages
//! devices understand. Delivery is fire-and-forget.

pub mod dispatch;
pub mod messages;
pub mod registry;
pub mod ws;

pub use dispatch::{ActionNotice, CommandDispatcher};
pub use messages::{ActionStatus, InboundMessage, LoginUser, OutboundMessage};
pub use registry::{BroadcastReport, ConnectionId, ConnectionRegistry, DeviceId};
pub use ws::{DeviceHub, InboundHandler};

use axum::{routing::get, Router};
use thiserror::Error;

/// Why a message did not reach a device. Never fatal to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("device {0} is not connected")]
    NotConnected(DeviceId),

    #[error("delivery to device {0} failed")]
    DeliveryFailed(DeviceId),

    #[error("malformed inbound message: {0}")]
    MalformedInbound(String),
}

/// Routes for device sockets.
pub fn router(hub: DeviceHub) -> Router {
    Router::new()
        .route("/ws/device/{device_id}", get(ws::ws_handler))
        .with_state(hub)
}
