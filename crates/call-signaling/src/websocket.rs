use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message, error::ProtocolError},
};
use url::Url;

use crate::events::{ClientEvent, ServerEvent};
use crate::transport::{SignalingChannel, SignalingError, SignalingResult, SignalingTransport};

const WEBSOCKET_PATH: &str = "ws";

/// Websocket connection to a rendezvous server speaking JSON text frames.
pub struct WsSignaling {
    send_tx: mpsc::UnboundedSender<String>,
}

impl WsSignaling {
    pub async fn connect(signaling_url: &str) -> SignalingResult<SignalingChannel> {
        let websocket_url = derive_websocket_url(signaling_url)?;
        let (ws_stream, _) = connect_async(websocket_url.as_str())
            .await
            .map_err(|err| SignalingError::Setup(format!("websocket connect failed: {err}")))?;
        tracing::debug!(
            target = "signaling",
            url = %websocket_url,
            "signaling websocket connected"
        );
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();

        tokio::spawn(async move {
            while let Some(text) = send_rx.recv().await {
                if ws_write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        match &err {
                            WsError::ConnectionClosed
                            | WsError::AlreadyClosed
                            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                                tracing::debug!(target = "signaling", "signaling websocket closed");
                            }
                            _ => {
                                tracing::warn!(
                                    target = "signaling",
                                    error = %err,
                                    "signaling websocket error"
                                );
                            }
                        }
                        break;
                    }
                };
                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        tracing::trace!(target = "signaling", event = event.name(), "ws_in");
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(
                            target = "signaling",
                            error = %err,
                            len = text.len(),
                            "ignoring unrecognised signaling frame"
                        );
                    }
                }
            }
        });

        let sender: Arc<dyn SignalingTransport> = Arc::new(WsSignaling { send_tx });
        Ok(SignalingChannel::new(sender, event_rx))
    }
}

impl SignalingTransport for WsSignaling {
    fn emit(&self, event: ClientEvent) -> SignalingResult<()> {
        let name = event.name();
        let text = serde_json::to_string(&event)
            .map_err(|source| SignalingError::Encode { event: name, source })?;
        tracing::trace!(target = "signaling", event = name, "ws_out");
        self.send_tx.send(text).map_err(|_| SignalingError::Closed)
    }
}

/// Normalises a user-supplied signaling address into the server's websocket
/// endpoint: `localhost:881`, `http://host:881` and `ws://host:881/ws` all
/// resolve to `ws://host:881/ws`.
pub fn derive_websocket_url(signaling_url: &str) -> SignalingResult<Url> {
    let trimmed = signaling_url.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("ws://{trimmed}")
    };
    let base = Url::parse(&candidate).map_err(|err| {
        SignalingError::Setup(format!("invalid signaling url {signaling_url}: {err}"))
    })?;

    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(SignalingError::Setup(format!(
                "unsupported signaling scheme {other}"
            )));
        }
    };

    let mut ws = base.clone();
    ws.set_scheme(scheme)
        .map_err(|_| SignalingError::Setup("invalid websocket scheme".into()))?;
    let path = base.path().trim_matches('/');
    if path.is_empty() {
        ws.set_path(WEBSOCKET_PATH);
    }
    ws.set_fragment(None);
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_gets_ws_scheme_and_path() {
        let url = derive_websocket_url("localhost:881").expect("url");
        assert_eq!(url.as_str(), "ws://localhost:881/ws");
    }

    #[test]
    fn https_maps_to_wss() {
        let url = derive_websocket_url("https://call.example.com").expect("url");
        assert_eq!(url.as_str(), "wss://call.example.com/ws");
    }

    #[test]
    fn explicit_path_is_kept() {
        let url = derive_websocket_url("ws://127.0.0.1:881/rooms/lobby").expect("url");
        assert_eq!(url.as_str(), "ws://127.0.0.1:881/rooms/lobby");
    }

    #[test]
    fn rejects_other_schemes() {
        let err = derive_websocket_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, SignalingError::Setup(_)));
    }
}
