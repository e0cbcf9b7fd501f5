use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::messages::OutboundMessage;
use crate::DispatchError;

/// Key correlating a live socket with a persisted device record.
pub type DeviceId = i64;

/// Identifies one registration. A device that reconnects gets a new id, so the
/// teardown of the old socket cannot evict the new one.
pub type ConnectionId = u64;

/// A connected device's outbound half.
///
/// The sender feeds the single writer task that owns the socket sink, which
/// keeps writes to one device ordered and never blocks the registry.
pub struct DeviceConnection {
    pub conn_id: ConnectionId,
    pub tx: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

/// Outcome of a [`ConnectionRegistry::broadcast`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<DeviceId>,
    /// Devices whose channel was closed. They are no longer registered.
    pub failed: Vec<DeviceId>,
}

/// Active device connections, keyed by device id.
///
/// One instance is built at startup and shared behind an `Arc`. All mapping
/// mutations go through the `DashMap`; no guard is held across an `.await`.
pub struct ConnectionRegistry {
    connections: DashMap<DeviceId, DeviceConnection>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register `tx` as the connection for `device_id`, replacing any previous
    /// registration. The replaced channel is dropped, not closed explicitly.
    pub fn register(
        &self,
        device_id: DeviceId,
        tx: mpsc::UnboundedSender<String>,
    ) -> ConnectionId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.connections.insert(
            device_id,
            DeviceConnection {
                conn_id,
                tx,
                connected_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            debug!(
                device_id,
                replaced_conn = previous.conn_id,
                conn_id,
                "device re-registered, previous connection dropped"
            );
        }
        info!(device_id, conn_id, "device connected");
        conn_id
    }

    /// Remove whatever connection is registered for `device_id`. No-op if absent.
    pub fn unregister(&self, device_id: DeviceId) {
        if self.connections.remove(&device_id).is_some() {
            info!(device_id, "device disconnected");
        }
    }

    /// Remove the registration for `device_id` only if it is still `conn_id`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister_connection(&self, device_id: DeviceId, conn_id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(&device_id, |_, conn| conn.conn_id == conn_id)
            .is_some();
        if removed {
            info!(device_id, conn_id, "device disconnected");
        }
        removed
    }

    /// Deliver `message` to one device.
    pub fn send_to(
        &self,
        device_id: DeviceId,
        message: &OutboundMessage,
    ) -> Result<(), DispatchError> {
        self.send_text(device_id, message.to_json())
    }

    /// Deliver already-serialized JSON text to one device.
    ///
    /// On a closed channel the stale entry is removed and `DeliveryFailed` is
    /// returned. A missing entry yields `NotConnected` and writes nothing.
    fn send_text(&self, device_id: DeviceId, text: String) -> Result<(), DispatchError> {
        let stale_conn = {
            let Some(conn) = self.connections.get(&device_id) else {
                return Err(DispatchError::NotConnected(device_id));
            };
            match conn.tx.send(text) {
                Ok(()) => return Ok(()),
                Err(_) => conn.conn_id,
            }
        };

        self.connections
            .remove_if(&device_id, |_, conn| conn.conn_id == stale_conn);
        warn!(device_id, conn_id = stale_conn, "delivery failed, connection removed");
        Err(DispatchError::DeliveryFailed(device_id))
    }

    /// Attempt delivery to every registered device independently.
    pub fn broadcast(&self, message: &OutboundMessage) -> BroadcastReport {
        let text = message.to_json();
        let mut report = BroadcastReport::default();
        let mut stale = Vec::new();

        for entry in self.connections.iter() {
            if entry.tx.send(text.clone()).is_ok() {
                report.delivered.push(*entry.key());
            } else {
                stale.push((*entry.key(), entry.conn_id));
            }
        }

        // Removal happens after iteration so no shard lock is re-entered.
        for (device_id, conn_id) in stale {
            self.connections
                .remove_if(&device_id, |_, conn| conn.conn_id == conn_id);
            warn!(device_id, conn_id, "broadcast delivery failed, connection removed");
            report.failed.push(device_id);
        }

        report.delivered.sort_unstable();
        report.failed.sort_unstable();
        report
    }

    pub fn is_connected(&self, device_id: DeviceId) -> bool {
        self.connections.contains_key(&device_id)
    }

    /// Currently registered device ids, ascending.
    pub fn connected_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Seconds since `device_id` registered its current connection.
    pub fn connected_for_secs(&self, device_id: DeviceId) -> Option<u64> {
        self.connections
            .get(&device_id)
            .map(|conn| conn.connected_at.elapsed().as_secs())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
