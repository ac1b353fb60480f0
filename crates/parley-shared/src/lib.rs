// Wire model shared by the relay and its clients.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::EnvelopeError;
pub use protocol::{
    Body, Envelope, EnvelopeKind, FileAnnounce, IceCandidate, OutboundEnvelope, RelayEnvelope, SdpKind,
    SessionDescription, SignalPayload, WireEnvelope,
};
pub use types::{ConnectionId, FileId, Recipient, SessionId};
