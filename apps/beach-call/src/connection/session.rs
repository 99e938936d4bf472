use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use call_signaling::{IceCandidate, PeerId, SessionDescription};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::{LocalMedia, RemoteTrack};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("media session error: {0}")]
    Rtc(String),
    #[error("media session closed")]
    Closed,
}

impl From<webrtc::Error> for SessionError {
    fn from(err: webrtc::Error) -> Self {
        SessionError::Rtc(err.to_string())
    }
}

/// Connectivity as reported by the underlying peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    StateChanged(TransportState),
}

/// A session event tagged with the handler that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerEvent {
    pub handler_id: u64,
    pub peer: PeerId,
    pub event: SessionEvent,
}

/// Callback side of a media session: forwards everything the session
/// observes to the orchestrator's queue, tagged with the owning handler.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    handler_id: u64,
    peer: PeerId,
    tx: mpsc::UnboundedSender<HandlerEvent>,
}

impl SessionEvents {
    pub fn new(handler_id: u64, peer: PeerId, tx: mpsc::UnboundedSender<HandlerEvent>) -> Self {
        Self {
            handler_id,
            peer,
            tx,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn handler_id(&self) -> u64 {
        self.handler_id
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.publish(SessionEvent::LocalCandidate(candidate));
    }

    pub fn remote_track(&self, track: RemoteTrack) {
        self.publish(SessionEvent::RemoteTrack(track));
    }

    pub fn state_changed(&self, state: TransportState) {
        self.publish(SessionEvent::StateChanged(state));
    }

    fn publish(&self, event: SessionEvent) {
        // The orchestrator may already be gone during shutdown.
        let _ = self.tx.send(HandlerEvent {
            handler_id: self.handler_id,
            peer: self.peer.clone(),
            event,
        });
    }
}

/// One real-time media session, as the connection handler consumes it.
///
/// `create_offer` and `create_answer` also install the result as the local
/// description; candidate gathering starts there and is reported through
/// [`SessionEvents`].
#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<(), SessionError>;
    async fn create_offer(&self) -> Result<SessionDescription, SessionError>;
    async fn create_answer(&self) -> Result<SessionDescription, SessionError>;
    async fn set_remote_description(&self, description: SessionDescription)
    -> Result<(), SessionError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError>;
    async fn close(&self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, events: SessionEvents) -> Result<Arc<dyn MediaSession>, SessionError>;
}
