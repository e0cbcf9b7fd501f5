use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::messages::{ActionStatus, LoginUser, OutboundMessage};
use crate::registry::{BroadcastReport, ConnectionRegistry, DeviceId};
use crate::DispatchError;

/// The fields of a persisted action that devices care about.
#[derive(Debug, Clone)]
pub struct ActionNotice {
    pub action_id: i64,
    pub id_device: DeviceId,
    pub action_type: String,
    pub executed: bool,
    pub created_at: DateTime<Utc>,
}

/// Turns domain events into device notifications.
///
/// Delivery is best-effort: every method logs its own failure and hands the
/// outcome back, callers are free to ignore it. Nothing is queued or retried.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
    control_device: DeviceId,
}

impl CommandDispatcher {
    /// `control_device` receives login notifications.
    pub fn new(registry: Arc<ConnectionRegistry>, control_device: DeviceId) -> Self {
        Self {
            registry,
            control_device,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn control_device(&self) -> DeviceId {
        self.control_device
    }

    /// Push a newly created action to its device.
    pub fn action_created(&self, action: &ActionNotice) -> Result<(), DispatchError> {
        let msg = OutboundMessage::ActionExecute {
            action_id: action.action_id,
            id_device: action.id_device,
            action_type: action.action_type.clone(),
            timestamp: action.created_at,
        };
        self.deliver(action.id_device, &msg)
    }

    /// Tell a device that one of its actions changed state.
    pub fn action_updated(&self, action: &ActionNotice) -> Result<(), DispatchError> {
        let msg = OutboundMessage::ActionUpdated {
            action_id: action.action_id,
            id_device: action.id_device,
            status: ActionStatus::from_executed(action.executed),
        };
        self.deliver(action.id_device, &msg)
    }

    /// Announce to every device that an action was physically executed.
    pub fn action_confirmed(&self, action: &ActionNotice) -> BroadcastReport {
        let msg = OutboundMessage::ActionConfirmed {
            action_id: action.action_id,
            id_device: action.id_device,
            action_type: action.action_type.clone(),
            status: ActionStatus::Executed,
        };
        self.fan_out(&msg)
    }

    /// Notify the control device of a login, falling back to a broadcast
    /// without the user block when it cannot be reached.
    pub fn user_logged_in(&self, token: &str, user: LoginUser) -> Result<(), DispatchError> {
        let name = user.name.clone();
        let msg = OutboundMessage::Login {
            token: token.to_string(),
            name: name.clone(),
            user: Some(user),
        };
        match self.deliver(self.control_device, &msg) {
            Ok(()) => Ok(()),
            Err(err) => {
                let fallback = OutboundMessage::Login {
                    token: token.to_string(),
                    name,
                    user: None,
                };
                let report = self.fan_out(&fallback);
                debug!(
                    delivered = report.delivered.len(),
                    "login notification broadcast as fallback"
                );
                Err(err)
            }
        }
    }

    /// Relay a free-form status line to every device.
    pub fn status(&self, message: impl Into<String>) -> BroadcastReport {
        self.fan_out(&OutboundMessage::broadcast(message))
    }

    fn deliver(&self, device_id: DeviceId, msg: &OutboundMessage) -> Result<(), DispatchError> {
        match self.registry.send_to(device_id, msg) {
            Ok(()) => {
                info!(device_id, kind = msg.kind(), "notification sent");
                Ok(())
            }
            Err(err) => {
                warn!(device_id, kind = msg.kind(), error = %err, "notification not delivered");
                Err(err)
            }
        }
    }

    fn fan_out(&self, msg: &OutboundMessage) -> BroadcastReport {
        let report = self.registry.broadcast(msg);
        if !report.failed.is_empty() {
            warn!(kind = msg.kind(), failed = ?report.failed, "broadcast partially failed");
        }
        debug!(kind = msg.kind(), delivered = report.delivered.len(), "broadcast sent");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    fn notice(device: DeviceId, executed: bool) -> ActionNotice {
        ActionNotice {
            action_id: 1,
            id_device: device,
            action_type: "MOTOR_IZQ".into(),
            executed,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn setup(control: DeviceId) -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(ConnectionRegistry::new()), control)
    }

    fn json(text: String) -> serde_json::Value {
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_action_created_reaches_device_exactly_once() {
        let dispatcher = setup(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.registry().register(7, tx);

        dispatcher.action_created(&notice(7, false)).unwrap();

        let msg = json(rx.try_recv().unwrap());
        assert_eq!(msg["type"], "action_execute");
        assert_eq!(msg["action_id"], 1);
        assert_eq!(msg["id_device"], 7);
        assert_eq!(msg["timestamp"], "2025-01-02T03:04:05Z");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_action_for_offline_device_is_not_connected() {
        let dispatcher = setup(1);
        assert_eq!(
            dispatcher.action_created(&notice(99, false)),
            Err(DispatchError::NotConnected(99))
        );
    }

    #[test]
    fn test_action_updated_reports_status() {
        let dispatcher = setup(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.registry().register(2, tx);

        dispatcher.action_updated(&notice(2, true)).unwrap();
        let msg = json(rx.try_recv().unwrap());
        assert_eq!(msg["event"], "action_updated");
        assert_eq!(msg["status"], "executed");
    }

    #[test]
    fn test_action_confirmed_is_broadcast() {
        let dispatcher = setup(1);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        dispatcher.registry().register(2, tx_a);
        dispatcher.registry().register(3, tx_b);

        let report = dispatcher.action_confirmed(&notice(2, true));
        assert_eq!(report.delivered, vec![2, 3]);
        assert_eq!(json(rx_a.try_recv().unwrap())["event"], "action_confirmed");
        assert_eq!(json(rx_b.try_recv().unwrap())["event"], "action_confirmed");
    }

    fn admin() -> LoginUser {
        LoginUser {
            id: 1,
            username: "admin".into(),
            name: "Administrator".into(),
            email: "admin@example.com".into(),
        }
    }

    #[test]
    fn test_login_goes_to_control_device_only() {
        let dispatcher = setup(1);
        let (tx_ctrl, mut rx_ctrl) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        dispatcher.registry().register(1, tx_ctrl);
        dispatcher.registry().register(5, tx_other);

        dispatcher.user_logged_in("tok", admin()).unwrap();

        let msg = json(rx_ctrl.try_recv().unwrap());
        assert_eq!(msg["type"], "login");
        assert_eq!(msg["user"]["email"], "admin@example.com");
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn test_login_falls_back_to_broadcast() {
        let dispatcher = setup(1);
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        dispatcher.registry().register(5, tx_other);

        let err = dispatcher.user_logged_in("tok", admin()).unwrap_err();
        assert_eq!(err, DispatchError::NotConnected(1));

        let msg = json(rx_other.try_recv().unwrap());
        assert_eq!(msg["type"], "login");
        assert_eq!(msg["token"], "tok");
        assert!(msg.get("user").is_none());
    }

    #[test]
    fn test_status_broadcast() {
        let dispatcher = setup(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.registry().register(4, tx);

        dispatcher.status("door open");
        let msg = json(rx.try_recv().unwrap());
        assert_eq!(msg["type"], "broadcast");
        assert_eq!(msg["message"], "door open");
    }
}
