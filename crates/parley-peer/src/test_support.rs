//! Recording backend for driving the coordinator in unit tests.

use bytes::Bytes;
use parley_shared::SessionId;

use crate::backend::{PeerBackend, RemoteSignal};
use crate::error::PeerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartOffer(SessionId),
    StartAnswer(SessionId, RemoteSignal),
    ApplyAnswer(SessionId, RemoteSignal),
    Send(SessionId, Bytes),
    Close(SessionId),
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    pub refuse_offers: bool,
}

impl RecordingBackend {
    pub fn sent(&self) -> Vec<(SessionId, Bytes)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Send(id, data) => Some((*id, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self, session: SessionId) -> bool {
        self.calls.contains(&Call::Close(session))
    }
}

impl PeerBackend for RecordingBackend {
    fn start_offer(&mut self, session: SessionId) -> Result<(), PeerError> {
        if self.refuse_offers {
            return Err(PeerError::Negotiation("no peer connection available".into()));
        }
        self.calls.push(Call::StartOffer(session));
        Ok(())
    }

    fn start_answer(&mut self, session: SessionId, remote: RemoteSignal) -> Result<(), PeerError> {
        self.calls.push(Call::StartAnswer(session, remote));
        Ok(())
    }

    fn apply_answer(&mut self, session: SessionId, remote: RemoteSignal) -> Result<(), PeerError> {
        self.calls.push(Call::ApplyAnswer(session, remote));
        Ok(())
    }

    fn send(&mut self, session: SessionId, payload: Bytes) -> Result<(), PeerError> {
        self.calls.push(Call::Send(session, payload));
        Ok(())
    }

    fn close(&mut self, session: SessionId) {
        self.calls.push(Call::Close(session));
    }
}
