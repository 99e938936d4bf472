use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use call_signaling::{ClientEvent, Relay};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(relay): State<Arc<Relay>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

/// Runs one user's session: join, relay every event they send, leave on close.
async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let (peer_id, mut events) = relay.join();
    let (mut sender, mut receiver) = socket.split();

    // Ends once the relay drops this user's queue on leave.
    let writer_peer = peer_id.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(target = "relay", peer = %writer_peer, error = %err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
        debug!(target = "relay", peer = %writer_peer, "writer ended");
    });

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!(target = "relay", peer = %peer_id, "non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(err) => {
                warn!(target = "relay", peer = %peer_id, error = %err, "websocket error");
                break;
            }
        };
        match serde_json::from_str::<ClientEvent>(&text) {
            // Unknown addressees are logged by the relay and otherwise ignored.
            Ok(event) => {
                let _ = relay.route(&peer_id, event);
            }
            Err(err) => {
                warn!(target = "relay", peer = %peer_id, error = %err, "unparseable client event");
            }
        }
    }

    relay.leave(&peer_id);
}
