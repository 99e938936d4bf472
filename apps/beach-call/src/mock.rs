//! In-memory collaborators for exercising the call client without a network
//! or capture devices.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use call_signaling::{
    ClientEvent, IceCandidate, PeerId, SessionDescription, SignalingResult, SignalingTransport,
};
use parking_lot::Mutex;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::connection::{MediaSession, SessionError, SessionEvents, SessionFactory, TransportState};
use crate::media::{
    CaptureError, CaptureProvider, LocalMedia, MediaConstraints, MediaKind, RemoteTrack, StreamRef,
};

#[derive(Debug, Clone, Default)]
struct SessionRecord {
    handler_id: u64,
    peer: Option<PeerId>,
    local_stream: Option<String>,
    applied: Vec<IceCandidate>,
    closed: bool,
}

#[derive(Default)]
struct MockState {
    sessions: Vec<SessionRecord>,
    reject_candidates: HashSet<PeerId>,
}

impl MockState {
    fn latest(&self, peer: &PeerId) -> Option<&SessionRecord> {
        self.sessions
            .iter()
            .rev()
            .find(|record| record.peer.as_ref() == Some(peer))
    }

    fn record_mut(&mut self, handler_id: u64) -> Option<&mut SessionRecord> {
        self.sessions
            .iter_mut()
            .find(|record| record.handler_id == handler_id)
    }
}

/// Session factory whose sessions negotiate instantly: each produces one
/// local candidate when its local description is set, and announces a remote
/// track plus a connected transport once both descriptions are in place.
#[derive(Clone, Default)]
pub struct MockSessionFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions opened for `peer` reject every remote candidate.
    pub fn reject_candidates_from(&self, peer: impl Into<PeerId>) {
        self.state.lock().reject_candidates.insert(peer.into());
    }

    pub fn sessions_opened(&self, peer: &PeerId) -> usize {
        self.state
            .lock()
            .sessions
            .iter()
            .filter(|record| record.peer.as_ref() == Some(peer))
            .count()
    }

    pub fn applied_candidates(&self, peer: &PeerId) -> Vec<IceCandidate> {
        self.state
            .lock()
            .latest(peer)
            .map(|record| record.applied.clone())
            .unwrap_or_default()
    }

    pub fn local_stream(&self, peer: &PeerId) -> Option<String> {
        self.state
            .lock()
            .latest(peer)
            .and_then(|record| record.local_stream.clone())
    }

    pub fn is_closed(&self, peer: &PeerId) -> bool {
        self.state
            .lock()
            .latest(peer)
            .map(|record| record.closed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self, events: SessionEvents) -> Result<Arc<dyn MediaSession>, SessionError> {
        self.state.lock().sessions.push(SessionRecord {
            handler_id: events.handler_id(),
            peer: Some(events.peer().clone()),
            ..Default::default()
        });
        Ok(Arc::new(MockSession {
            events,
            state: Arc::clone(&self.state),
            progress: Mutex::new(Progress::default()),
        }))
    }
}

#[derive(Default)]
struct Progress {
    local: bool,
    remote: bool,
    announced: bool,
}

struct MockSession {
    events: SessionEvents,
    state: Arc<Mutex<MockState>>,
    progress: Mutex<Progress>,
}

impl MockSession {
    fn local_set(&self) {
        self.progress.lock().local = true;
        self.events.local_candidate(IceCandidate {
            candidate: format!(
                "candidate:mock {} 1 udp 2122260223 127.0.0.1 9 typ host",
                self.events.handler_id()
            ),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        });
        self.maybe_announce();
    }

    fn maybe_announce(&self) {
        {
            let mut progress = self.progress.lock();
            if !(progress.local && progress.remote) || progress.announced {
                return;
            }
            progress.announced = true;
        }
        self.events.remote_track(RemoteTrack {
            stream: StreamRef::new(format!("remote-{}", self.events.peer())),
            track_id: "video".into(),
            kind: MediaKind::Video,
        });
        self.events.state_changed(TransportState::Connected);
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        let state = self.state.lock();
        let closed = state
            .sessions
            .iter()
            .any(|record| record.handler_id == self.events.handler_id() && record.closed);
        if closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaSession for MockSession {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<(), SessionError> {
        self.ensure_open()?;
        if let Some(record) = self.state.lock().record_mut(self.events.handler_id()) {
            record.local_stream = Some(media.stream().id.clone());
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        self.ensure_open()?;
        self.local_set();
        Ok(SessionDescription::offer(format!(
            "mock-offer for {}",
            self.events.peer()
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        self.ensure_open()?;
        if !self.progress.lock().remote {
            return Err(SessionError::Rtc("no remote offer to answer".into()));
        }
        self.local_set();
        Ok(SessionDescription::answer(format!(
            "mock-answer for {}",
            self.events.peer()
        )))
    }

    async fn set_remote_description(
        &self,
        _description: SessionDescription,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.progress.lock().remote = true;
        self.maybe_announce();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if state.reject_candidates.contains(self.events.peer()) || candidate.candidate.is_empty() {
            return Err(SessionError::Rtc("candidate rejected".into()));
        }
        if let Some(record) = state.record_mut(self.events.handler_id()) {
            record.applied.push(candidate);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        if let Some(record) = self.state.lock().record_mut(self.events.handler_id()) {
            record.closed = true;
        }
        Ok(())
    }
}

/// Capture provider that hands out a single silent VP8 track, or refuses.
#[derive(Debug, Clone)]
pub struct MockCapture {
    stream_id: String,
    deny: bool,
}

impl MockCapture {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            deny: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            stream_id: String::new(),
            deny: true,
        }
    }
}

#[async_trait]
impl CaptureProvider for MockCapture {
    async fn capture(&self, constraints: MediaConstraints) -> Result<LocalMedia, CaptureError> {
        if self.deny {
            return Err(CaptureError::Denied("permission dismissed".into()));
        }
        if !constraints.audio && !constraints.video {
            return Err(CaptureError::NothingRequested);
        }
        let track: Arc<dyn TrackLocal + Send + Sync> = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            self.stream_id.clone(),
        ));
        Ok(LocalMedia::new(self.stream_id.clone(), vec![track]))
    }
}

/// Signaling transport that keeps every emitted event for inspection.
#[derive(Debug, Default)]
pub struct RecordingSignaling {
    emitted: Mutex<Vec<ClientEvent>>,
}

impl RecordingSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted.lock().clone()
    }

    pub fn take(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.emitted.lock())
    }
}

impl SignalingTransport for RecordingSignaling {
    fn emit(&self, event: ClientEvent) -> SignalingResult<()> {
        self.emitted.lock().push(event);
        Ok(())
    }
}
