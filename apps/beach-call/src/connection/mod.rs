//! One peer link: a media session plus the negotiation state around it.

pub mod rtc;
pub mod session;
pub mod state;

use std::sync::Arc;

use call_signaling::{IceCandidate, PeerId, SdpKind, SessionDescription};
use thiserror::Error;
use tracing::{debug, warn};

use crate::media::LocalMedia;
pub use session::{
    HandlerEvent, MediaSession, SessionError, SessionEvent, SessionEvents, SessionFactory,
    TransportState,
};
pub use state::{Action, IllegalTransition, NegotiationState};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("expected an {expected:?} description, got {got:?}")]
    WrongDescription { expected: SdpKind, got: SdpKind },
    #[error("no remote description while {0}")]
    NoRemoteDescription(NegotiationState),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What happened to a remote candidate handed to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    Queued,
}

pub struct ConnectionHandler {
    id: u64,
    peer: PeerId,
    session: Arc<dyn MediaSession>,
    state: NegotiationState,
    transport: TransportState,
    pending_candidates: Vec<IceCandidate>,
}

impl ConnectionHandler {
    pub async fn open(
        factory: &dyn SessionFactory,
        events: SessionEvents,
    ) -> Result<Self, ConnectionError> {
        let id = events.handler_id();
        let peer = events.peer().clone();
        let session = factory.open(events).await?;
        Ok(Self {
            id,
            peer,
            session,
            state: NegotiationState::New,
            transport: TransportState::New,
            pending_candidates: Vec::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub async fn add_local_media(&mut self, media: &LocalMedia) -> Result<(), ConnectionError> {
        self.session.add_local_media(media).await?;
        Ok(())
    }

    pub async fn create_offer(&mut self) -> Result<SessionDescription, ConnectionError> {
        let next = self.state.transition(Action::CreateOffer)?;
        let offer = self.session.create_offer().await?;
        self.state = next;
        Ok(offer)
    }

    /// Applies a remote offer and returns the local answer.
    pub async fn create_answer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, ConnectionError> {
        expect_kind(&offer, SdpKind::Offer)?;
        let pending = self.state.transition(Action::AcceptOffer)?;
        self.session.set_remote_description(offer).await?;
        self.state = pending;

        let next = self.state.transition(Action::SendAnswer)?;
        let answer = self.session.create_answer().await?;
        self.state = next;
        Ok(answer)
    }

    pub async fn set_answer(&mut self, answer: SessionDescription) -> Result<(), ConnectionError> {
        expect_kind(&answer, SdpKind::Answer)?;
        let next = self.state.transition(Action::ApplyAnswer)?;
        self.session.set_remote_description(answer).await?;
        self.state = next;
        Ok(())
    }

    /// Applies a remote candidate, or queues it while our offer is still
    /// waiting for an answer.
    pub async fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, ConnectionError> {
        if self.state == NegotiationState::OfferSent {
            self.pending_candidates.push(candidate);
            return Ok(CandidateDisposition::Queued);
        }
        if !self.state.has_remote_description() {
            return Err(ConnectionError::NoRemoteDescription(self.state));
        }
        self.session.add_ice_candidate(candidate).await?;
        Ok(CandidateDisposition::Applied)
    }

    /// Applies every candidate queued before the answer arrived. Stops at the
    /// first rejection.
    pub async fn flush_pending_candidates(&mut self) -> Result<usize, ConnectionError> {
        if self.pending_candidates.is_empty() {
            return Ok(0);
        }
        if !self.state.has_remote_description() {
            return Err(ConnectionError::NoRemoteDescription(self.state));
        }
        let pending = std::mem::take(&mut self.pending_candidates);
        let count = pending.len();
        for candidate in pending {
            self.session.add_ice_candidate(candidate).await?;
        }
        debug!(target = "call", peer = %self.peer, count, "flushed queued candidates");
        Ok(count)
    }

    /// Records the session's connectivity; a failed transport fails the link.
    pub fn mark_transport(&mut self, transport: TransportState) {
        self.transport = transport;
        if transport == TransportState::Failed && !self.state.is_terminal() {
            if let Ok(next) = self.state.transition(Action::Fail) {
                self.state = next;
            }
        }
    }

    /// Closes the media session once; later calls do nothing.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        let next = match self.state.transition(Action::Close) {
            Ok(next) => next,
            Err(err) => {
                warn!(target = "call", peer = %self.peer, error = %err, "close refused");
                return;
            }
        };
        if let Err(err) = self.session.close().await {
            warn!(target = "call", peer = %self.peer, error = %err, "closing media session failed");
        }
        self.pending_candidates.clear();
        self.state = next;
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("pending_candidates", &self.pending_candidates.len())
            .finish()
    }
}

fn expect_kind(description: &SessionDescription, expected: SdpKind) -> Result<(), ConnectionError> {
    if description.kind == expected {
        Ok(())
    } else {
        Err(ConnectionError::WrongDescription {
            expected,
            got: description.kind,
        })
    }
}
