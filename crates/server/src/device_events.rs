//! Handling of messages devices send over their sockets.

use std::sync::Arc;

use async_trait::async_trait;
use iot_panel_relay::{DeviceId, InboundHandler, InboundMessage, OutboundMessage};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::authenticate;
use crate::routes::actions::record_confirmation;
use crate::state::AppState;

pub struct DeviceEvents {
    state: Arc<AppState>,
}

impl DeviceEvents {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn auth(&self, device_id: DeviceId, token: &str) -> OutboundMessage {
        match authenticate(&self.state, token).await {
            Ok(user) => {
                info!(device_id, username = %user.username, "device authenticated");
                OutboundMessage::AuthResponse {
                    success: true,
                    message: format!("Authenticated as {}", user.username),
                }
            }
            Err(err) => {
                warn!(device_id, error = %err, "device authentication failed");
                OutboundMessage::AuthResponse {
                    success: false,
                    message: "Invalid or inactive token".to_string(),
                }
            }
        }
    }

    async fn action_status(&self, device_id: DeviceId, action_id: i64, status: Option<String>) {
        if let Some(status) = status.as_deref().filter(|s| *s != "executed") {
            debug!(device_id, action_id, status, "ignoring non-final action status");
            return;
        }

        let action = match self.state.db.get_action(action_id).await {
            Ok(Some(action)) => action,
            Ok(None) => {
                warn!(device_id, action_id, "device reported unknown action");
                return;
            }
            Err(err) => {
                warn!(device_id, action_id, error = %err, "action lookup failed");
                return;
            }
        };
        if action.id_device != device_id {
            warn!(
                device_id,
                action_id,
                owner = action.id_device,
                "device reported an action it does not own"
            );
            return;
        }

        if let Err(err) = record_confirmation(&self.state, action_id).await {
            warn!(device_id, action_id, error = %err, "failed to record confirmation");
        }
    }
}

#[async_trait]
impl InboundHandler for DeviceEvents {
    async fn handle(&self, device_id: DeviceId, message: InboundMessage) -> Option<OutboundMessage> {
        match message {
            InboundMessage::Auth { token } => Some(self.auth(device_id, &token).await),
            InboundMessage::ActionStatus { action_id, status } => {
                self.action_status(device_id, action_id, status).await;
                None
            }
            InboundMessage::Status { fields } => {
                let payload = Value::Object(fields);
                self.state
                    .dispatcher
                    .status(format!("Status update from device {device_id}: {payload}"));
                None
            }
        }
    }
}
