use parley_shared::{EnvelopeError, FileId, SessionId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Unknown file: {0}")]
    UnknownFile(FileId),

    #[error("File has no content yet: {0}")]
    FileNotReady(FileId),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Relay connection error: {0}")]
    Relay(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}
