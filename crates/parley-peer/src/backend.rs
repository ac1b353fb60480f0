//! Seam between the negotiation logic and the peer-connection capability.

use bytes::Bytes;
use parley_shared::{IceCandidate, SessionDescription, SessionId, SignalPayload};
use tokio::sync::mpsc;

use crate::error::PeerError;
use crate::negotiation::PeerEvent;

/// Channel on which a backend reports completions, tagged by session.
pub type PeerEventSink = mpsc::UnboundedSender<(SessionId, PeerEvent)>;
pub type PeerEventStream = mpsc::UnboundedReceiver<(SessionId, PeerEvent)>;

pub fn event_channel() -> (PeerEventSink, PeerEventStream) {
    mpsc::unbounded_channel()
}

/// Remote half of a negotiation as carried by `search` / `find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSignal {
    pub sdp: SessionDescription,
    pub ice: IceCandidate,
}

impl From<&SignalPayload> for RemoteSignal {
    fn from(payload: &SignalPayload) -> Self {
        Self {
            sdp: payload.sdp.clone(),
            ice: payload.ice.clone(),
        }
    }
}

/// Peer transport capability.
///
/// Every call returns immediately; the outcome of asynchronous work is
/// reported later through the backend's [`PeerEventSink`] as
/// [`PeerEvent`]s. An `Err` return means the step could not even start.
pub trait PeerBackend: Send {
    /// Create a peer connection with an unreliable data channel and start
    /// producing a local offer and ICE candidate.
    fn start_offer(&mut self, session: SessionId) -> Result<(), PeerError>;

    /// Apply a remote offer, produce a local answer and ICE candidate, and
    /// wait for the remote data channel.
    fn start_answer(&mut self, session: SessionId, remote: RemoteSignal) -> Result<(), PeerError>;

    /// Apply the remote answer to an offering session.
    fn apply_answer(&mut self, session: SessionId, remote: RemoteSignal) -> Result<(), PeerError>;

    /// Send one message on the session's data channel.
    fn send(&mut self, session: SessionId, payload: Bytes) -> Result<(), PeerError>;

    /// Tear the session down. Safe to call at any point, including while
    /// negotiation is still in flight.
    fn close(&mut self, session: SessionId);
}
