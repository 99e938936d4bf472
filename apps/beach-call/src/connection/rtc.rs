use std::sync::Arc;

use async_trait::async_trait;
use call_signaling::{IceCandidate, SdpKind, SessionDescription};
use tracing::{debug, info, trace};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use super::session::{MediaSession, SessionError, SessionEvents, SessionFactory, TransportState};
use crate::media::{LocalMedia, MediaKind, RemoteTrack, StreamRef};

impl From<RTCPeerConnectionState> for TransportState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
                TransportState::New
            }
            RTCPeerConnectionState::Connecting => TransportState::Connecting,
            RTCPeerConnectionState::Connected => TransportState::Connected,
            RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
            RTCPeerConnectionState::Failed => TransportState::Failed,
            RTCPeerConnectionState::Closed => TransportState::Closed,
        }
    }
}

fn media_kind(kind: RTPCodecType) -> MediaKind {
    match kind {
        RTPCodecType::Audio => MediaKind::Audio,
        _ => MediaKind::Video,
    }
}

fn signal_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

fn rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, SessionError> {
    let parsed = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(SessionError::from)
}

/// Opens peer connections through the `webrtc` crate with the default codec
/// set and interceptors.
pub struct RtcSessionFactory {
    api: API,
    configuration: RTCConfiguration,
}

impl RtcSessionFactory {
    pub fn new(ice_servers: &[String]) -> Result<Self, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };
        Ok(Self {
            api,
            configuration: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl SessionFactory for RtcSessionFactory {
    async fn open(&self, events: SessionEvents) -> Result<Arc<dyn MediaSession>, SessionError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.configuration.clone())
                .await?,
        );
        wire_callbacks(&pc, events);
        Ok(Arc::new(RtcSession { pc }))
    }
}

fn wire_callbacks(pc: &Arc<RTCPeerConnection>, events: SessionEvents) {
    let candidate_events = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let events = candidate_events.clone();
        Box::pin(async move {
            // `None` marks the end of gathering.
            let Some(candidate) = candidate else {
                debug!(target = "call", peer = %events.peer(), "ice gathering complete");
                return;
            };
            match candidate.to_json() {
                Ok(init) => events.local_candidate(signal_candidate(init)),
                Err(err) => debug!(
                    target = "call",
                    peer = %events.peer(),
                    error = %err,
                    "dropping unserialisable local candidate"
                ),
            }
        })
    }));

    let track_events = events.clone();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let events = track_events.clone();
            Box::pin(async move {
                let remote = RemoteTrack {
                    stream: StreamRef::new(track.stream_id()),
                    track_id: track.id(),
                    kind: media_kind(track.kind()),
                };
                info!(
                    target = "call",
                    peer = %events.peer(),
                    stream = %remote.stream,
                    kind = %remote.kind,
                    "remote track arrived"
                );
                events.remote_track(remote);
                tokio::spawn(drain_remote_track(track, events.peer().to_string()));
            })
        },
    ));

    let state_events = events;
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let events = state_events.clone();
        Box::pin(async move {
            events.state_changed(TransportState::from(state));
        })
    }));
}

// Media is not decoded here; reading keeps the receive pipeline moving.
async fn drain_remote_track(track: Arc<TrackRemote>, peer: String) {
    let mut packets: u64 = 0;
    while track.read_rtp().await.is_ok() {
        packets += 1;
        if packets % 500 == 0 {
            trace!(target = "call", peer = %peer, packets, "remote rtp");
        }
    }
    debug!(target = "call", peer = %peer, packets, "remote track ended");
}

pub struct RtcSession {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaSession for RtcSession {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<(), SessionError> {
        for track in media.tracks() {
            let sender = self.pc.add_track(Arc::clone(track)).await?;
            // RTCP has to be read for interceptors such as NACK to work.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SessionError> {
        let description = rtc_description(description)?;
        self.pc.set_remote_description(description).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.pc.add_ice_candidate(candidate_init(candidate)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.pc.close().await?;
        Ok(())
    }
}
