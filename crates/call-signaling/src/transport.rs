use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::{ClientEvent, ServerEvent};

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel closed")]
    Closed,
    #[error("signaling setup failed: {0}")]
    Setup(String),
    #[error("failed to encode {event}: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type SignalingResult<T> = Result<T, SignalingError>;

/// Outbound half of a connection to the rendezvous server.
///
/// Emission never blocks: implementations queue the event and a background
/// task writes it out, so the per-connection order is the call order.
pub trait SignalingTransport: Send + Sync {
    fn emit(&self, event: ClientEvent) -> SignalingResult<()>;
}

/// A connected signaling endpoint: the emitter plus the ordered stream of
/// events the server delivers.
pub struct SignalingChannel {
    pub sender: Arc<dyn SignalingTransport>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl SignalingChannel {
    pub fn new(
        sender: Arc<dyn SignalingTransport>,
        events: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self { sender, events }
    }

    pub fn into_parts(
        self,
    ) -> (
        Arc<dyn SignalingTransport>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        (self.sender, self.events)
    }
}
