use call_signaling::{PeerId, SignalingError};
use thiserror::Error;

use crate::connection::ConnectionError;
use crate::directory::DirectoryError;
use crate::media::CaptureError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("local media capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("local media has not been started")]
    NoLocalMedia,
    #[error("connection with {peer} failed: {source}")]
    Connection {
        peer: PeerId,
        #[source]
        source: ConnectionError,
    },
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl CallError {
    pub fn connection(peer: &PeerId, source: impl Into<ConnectionError>) -> Self {
        CallError::Connection {
            peer: peer.clone(),
            source: source.into(),
        }
    }
}

pub type CallResult<T> = Result<T, CallError>;
