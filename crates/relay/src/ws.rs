use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::messages::{InboundMessage, OutboundMessage};
use crate::registry::{ConnectionRegistry, DeviceId};

/// Reacts to messages a device sends over its socket.
///
/// A returned message is written back to the sending device only.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, device_id: DeviceId, message: InboundMessage) -> Option<OutboundMessage>;
}

/// Everything a device socket needs: where to register and who handles input.
#[derive(Clone)]
pub struct DeviceHub {
    pub registry: Arc<ConnectionRegistry>,
    pub handler: Arc<dyn InboundHandler>,
}

impl DeviceHub {
    pub fn new(registry: Arc<ConnectionRegistry>, handler: Arc<dyn InboundHandler>) -> Self {
        Self { registry, handler }
    }
}

/// GET /ws/device/{device_id} - upgrade into a device connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(device_id): Path<DeviceId>,
    State(hub): State<DeviceHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_device(socket, device_id, hub))
}

/// Run one device connection until the transport closes.
pub async fn serve_device(socket: WebSocket, device_id: DeviceId, hub: DeviceHub) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = hub.registry.register(device_id, tx.clone());

    // Sole writer for this socket. When a write fails the receiver is
    // dropped, which makes the next registry send fail and evict the entry.
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            // Pong is handled automatically by axum
            Ok(_) => continue,
            Err(e) => {
                debug!(device_id, error = %e, "device socket read failed");
                break;
            }
        };

        match InboundMessage::parse(text.as_str()) {
            Ok(message) => {
                if let Some(reply) = hub.handler.handle(device_id, message).await {
                    let _ = tx.send(reply.to_json());
                }
            }
            Err(err) => {
                warn!(device_id, error = %err, "dropping inbound message");
            }
        }
    }

    hub.registry.unregister_connection(device_id, conn_id);
    writer.abort();
}
