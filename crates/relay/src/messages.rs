//! Wire messages exchanged with devices.
//!
//! Outbound payloads are a closed set so nothing unrecognized can reach a
//! device. Their shapes are fixed by the firmware: most carry a `type` tag,
//! the action status notifications carry an `event` tag instead.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::registry::DeviceId;
use crate::DispatchError;

/// Lifecycle state of an action as reported to devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Executed,
    Pending,
}

impl ActionStatus {
    pub fn from_executed(executed: bool) -> Self {
        if executed {
            Self::Executed
        } else {
            Self::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Pending => "pending",
        }
    }
}

/// User block embedded in a `login` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A new action the device should execute.
    ActionExecute {
        action_id: i64,
        id_device: DeviceId,
        action_type: String,
        timestamp: DateTime<Utc>,
    },
    ActionUpdated {
        action_id: i64,
        id_device: DeviceId,
        status: ActionStatus,
    },
    /// A device confirmed it executed the action.
    ActionConfirmed {
        action_id: i64,
        id_device: DeviceId,
        action_type: String,
        status: ActionStatus,
    },
    /// A user authenticated. `user` is omitted in the broadcast fallback.
    Login {
        token: String,
        name: String,
        user: Option<LoginUser>,
    },
    Broadcast {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Reply to an inbound `auth` message.
    AuthResponse { success: bool, message: String },
}

impl OutboundMessage {
    pub fn broadcast(message: impl Into<String>) -> Self {
        Self::Broadcast {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// The discriminator value, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ActionExecute { .. } => "action_execute",
            Self::ActionUpdated { .. } => "action_updated",
            Self::ActionConfirmed { .. } => "action_confirmed",
            Self::Login { .. } => "login",
            Self::Broadcast { .. } => "broadcast",
            Self::AuthResponse { .. } => "auth_response",
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::ActionExecute {
                action_id,
                id_device,
                action_type,
                timestamp,
            } => json!({
                "type": self.kind(),
                "action_id": action_id,
                "id_device": id_device,
                "action_type": action_type,
                "timestamp": iso(timestamp),
            }),
            Self::ActionUpdated {
                action_id,
                id_device,
                status,
            } => json!({
                "event": self.kind(),
                "action_id": action_id,
                "id_device": id_device,
                "status": status.as_str(),
            }),
            Self::ActionConfirmed {
                action_id,
                id_device,
                action_type,
                status,
            } => json!({
                "event": self.kind(),
                "action_id": action_id,
                "id_device": id_device,
                "action_type": action_type,
                "status": status.as_str(),
            }),
            Self::Login { token, name, user } => {
                let mut value = json!({
                    "type": self.kind(),
                    "success": true,
                    "token": token,
                    "name": name,
                });
                if let Some(user) = user {
                    value["user"] = json!(user);
                }
                value
            }
            Self::Broadcast { message, timestamp } => json!({
                "type": self.kind(),
                "message": message,
                "timestamp": iso(timestamp),
            }),
            Self::AuthResponse { success, message } => json!({
                "type": self.kind(),
                "success": success,
                "message": message,
            }),
        }
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Messages a device may send over its socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Auth {
        token: String,
    },
    /// The device reports it ran an action.
    ActionStatus {
        action_id: i64,
        #[serde(default)]
        status: Option<String>,
    },
    /// Free-form telemetry, relayed to every connected device.
    Status {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(text).map_err(|e| DispatchError::MalformedInbound(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_action_execute_shape() {
        let msg = OutboundMessage::ActionExecute {
            action_id: 1,
            id_device: 7,
            action_type: "MOTOR_IZQ".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
        };
        assert_eq!(
            msg.to_value(),
            json!({
                "type": "action_execute",
                "action_id": 1,
                "id_device": 7,
                "action_type": "MOTOR_IZQ",
                "timestamp": "2025-03-01T12:30:00Z",
            })
        );
    }

    #[test]
    fn test_status_notifications_use_event_tag() {
        let updated = OutboundMessage::ActionUpdated {
            action_id: 3,
            id_device: 2,
            status: ActionStatus::from_executed(false),
        }
        .to_value();
        assert_eq!(updated["event"], "action_updated");
        assert_eq!(updated["status"], "pending");
        assert!(updated.get("type").is_none());

        let confirmed = OutboundMessage::ActionConfirmed {
            action_id: 3,
            id_device: 2,
            action_type: "MOTOR_STOP".into(),
            status: ActionStatus::Executed,
        }
        .to_value();
        assert_eq!(confirmed["event"], "action_confirmed");
        assert_eq!(confirmed["action_type"], "MOTOR_STOP");
        assert_eq!(confirmed["status"], "executed");
    }

    #[test]
    fn test_login_with_and_without_user() {
        let user = LoginUser {
            id: 1,
            username: "admin".into(),
            name: "Administrator".into(),
            email: "admin@example.com".into(),
        };
        let full = OutboundMessage::Login {
            token: "jwt".into(),
            name: "Administrator".into(),
            user: Some(user),
        }
        .to_value();
        assert_eq!(full["success"], true);
        assert_eq!(full["user"]["username"], "admin");

        let reduced = OutboundMessage::Login {
            token: "jwt".into(),
            name: "Administrator".into(),
            user: None,
        }
        .to_value();
        assert!(reduced.get("user").is_none());
    }

    #[test]
    fn test_parse_inbound_variants() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"auth","token":"abc"}"#).unwrap(),
            InboundMessage::Auth { token: "abc".into() }
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"action_status","action_id":12}"#).unwrap(),
            InboundMessage::ActionStatus {
                action_id: 12,
                status: None
            }
        );
        let InboundMessage::Status { fields } =
            InboundMessage::parse(r#"{"type":"status","battery":81}"#).unwrap()
        else {
            panic!("expected status");
        };
        assert_eq!(fields["battery"], 81);
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(matches!(
            InboundMessage::parse(r#"{"type":"reboot"}"#),
            Err(DispatchError::MalformedInbound(_))
        ));
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(DispatchError::MalformedInbound(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"type":"action_status"}"#),
            Err(DispatchError::MalformedInbound(_))
        ));
    }
}
