use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture request named no audio or video")]
    NothingRequested,
    #[error("capture denied: {0}")]
    Denied(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Reference to a media stream as shown on a sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamRef {
    pub id: String,
}

impl StreamRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// The local capture: one stream id and the outgoing tracks that belong to it.
/// Cloning shares the same tracks.
#[derive(Clone)]
pub struct LocalMedia {
    stream: StreamRef,
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
}

impl LocalMedia {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>) -> Self {
        Self {
            stream: StreamRef::new(stream_id),
            tracks,
        }
    }

    pub fn stream(&self) -> &StreamRef {
        &self.stream
    }

    pub fn tracks(&self) -> &[Arc<dyn TrackLocal + Send + Sync>] {
        &self.tracks
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("stream", &self.stream)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// An inbound track announced by a media session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub stream: StreamRef,
    pub track_id: String,
    pub kind: MediaKind,
}

#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self, constraints: MediaConstraints) -> Result<LocalMedia, CaptureError>;
}

/// A render target a stream can be attached to.
pub trait MediaSink: Send + Sync {
    fn attach(&self, stream: StreamRef);
    fn attached(&self) -> Option<StreamRef>;
}

/// Capture backed by sample tracks that an embedding application feeds with
/// encoded frames (VP8 video, Opus audio).
#[derive(Debug, Default, Clone)]
pub struct SampleTrackCapture;

impl SampleTrackCapture {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureProvider for SampleTrackCapture {
    async fn capture(&self, constraints: MediaConstraints) -> Result<LocalMedia, CaptureError> {
        if !constraints.audio && !constraints.video {
            return Err(CaptureError::NothingRequested);
        }
        let stream_id = uuid::Uuid::new_v4().to_string();
        let mut tracks: Vec<Arc<dyn TrackLocal + Send + Sync>> = Vec::new();
        if constraints.audio {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            )));
        }
        if constraints.video {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id.clone(),
            )));
        }
        Ok(LocalMedia::new(stream_id, tracks))
    }
}

/// Sink that records what is attached and reports it through `tracing`.
#[derive(Debug)]
pub struct LoggingSink {
    name: &'static str,
    current: Mutex<Option<StreamRef>>,
}

impl LoggingSink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Mutex::new(None),
        }
    }
}

impl MediaSink for LoggingSink {
    fn attach(&self, stream: StreamRef) {
        info!(target = "call", sink = self.name, stream = %stream, "stream attached");
        *self.current.lock() = Some(stream);
    }

    fn attached(&self) -> Option<StreamRef> {
        self.current.lock().clone()
    }
}
