//! Per-session negotiation state machine.
//!
//! Every asynchronous source (local description, ICE gathering, data channel
//! transport) reports into [`Negotiation::apply`]; the returned
//! [`Transition`] tells the caller what to do next. The machine itself never
//! performs I/O.

use bytes::Bytes;
use parley_shared::{FileId, IceCandidate, SessionDescription, SessionId, SignalPayload};
use tracing::debug;

use crate::error::PeerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Downloader: creates the data channel and the offer
    Offerer,
    /// Uploader: answers a remote offer
    Answerer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    Created,
    Negotiating,
    /// Local SDP and ICE are both known and were handed out once
    Ready,
    /// The data channel transport is open
    Connected,
    Closed,
    Failed(String),
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Closed | NegotiationState::Failed(_))
    }
}

/// Completion reported by the peer transport for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    LocalDescription(SessionDescription),
    LocalCandidate(IceCandidate),
    ChannelOpen,
    Message(Bytes),
    ChannelClosed,
    Failed(String),
}

/// Outward signaling payload produced when a session becomes ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSignal {
    pub session: SessionId,
    pub sdp: SessionDescription,
    pub ice: IceCandidate,
}

impl LocalSignal {
    pub fn into_payload(self, uuid: FileId) -> SignalPayload {
        SignalPayload {
            uuid,
            session: self.session,
            sdp: self.sdp,
            ice: self.ice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    None,
    Ready(LocalSignal),
    Open,
    Received(Bytes),
    Closed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Negotiation {
    session: SessionId,
    role: Role,
    state: NegotiationState,
    local_sdp: Option<SessionDescription>,
    local_ice: Option<IceCandidate>,
    remote_applied: bool,
}

impl Negotiation {
    pub fn new(session: SessionId, role: Role) -> Self {
        Self {
            session,
            role,
            state: NegotiationState::Created,
            local_sdp: None,
            local_ice: None,
            remote_applied: false,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    pub fn local_sdp(&self) -> Option<&SessionDescription> {
        self.local_sdp.as_ref()
    }

    pub fn local_ice(&self) -> Option<&IceCandidate> {
        self.local_ice.as_ref()
    }

    /// Start negotiating. Completions that arrived earlier are kept, so the
    /// session may become ready immediately.
    pub fn begin(&mut self) -> Transition {
        if self.state != NegotiationState::Created {
            return Transition::None;
        }
        self.state = NegotiationState::Negotiating;
        self.check_ready()
    }

    /// Mark the remote answer as applied (offerer connect path).
    pub fn accept_answer(&mut self) -> Result<(), PeerError> {
        if self.role != Role::Offerer {
            return Err(PeerError::Negotiation(
                "only the offerer consumes an answer".into(),
            ));
        }
        if self.state != NegotiationState::Ready || self.remote_applied {
            return Err(PeerError::Negotiation(format!(
                "cannot apply answer in state {:?}",
                self.state
            )));
        }
        self.remote_applied = true;
        Ok(())
    }

    pub fn apply(&mut self, event: PeerEvent) -> Transition {
        if self.state.is_terminal() && event != PeerEvent::ChannelClosed {
            debug!(session = %self.session, event = ?event, "Ignoring event for finished session");
            return Transition::None;
        }

        match event {
            PeerEvent::LocalDescription(sdp) => {
                if self.local_sdp.is_none() {
                    self.local_sdp = Some(sdp);
                }
                self.check_ready()
            }
            PeerEvent::LocalCandidate(ice) => {
                if self.local_ice.is_none() {
                    self.local_ice = Some(ice);
                }
                self.check_ready()
            }
            PeerEvent::ChannelOpen => {
                if self.state == NegotiationState::Connected {
                    return Transition::None;
                }
                self.state = NegotiationState::Connected;
                Transition::Open
            }
            PeerEvent::Message(data) => Transition::Received(data),
            PeerEvent::ChannelClosed => {
                if self.state == NegotiationState::Closed {
                    return Transition::None;
                }
                self.state = NegotiationState::Closed;
                Transition::Closed
            }
            PeerEvent::Failed(reason) => {
                self.state = NegotiationState::Failed(reason.clone());
                Transition::Failed(reason)
            }
        }
    }

    fn check_ready(&mut self) -> Transition {
        if self.state != NegotiationState::Negotiating {
            return Transition::None;
        }
        match (&self.local_sdp, &self.local_ice) {
            (Some(sdp), Some(ice)) => {
                self.state = NegotiationState::Ready;
                debug!(session = %self.session, role = ?self.role, "Negotiation ready");
                Transition::Ready(LocalSignal {
                    session: self.session,
                    sdp: sdp.clone(),
                    ice: ice.clone(),
                })
            }
            _ => Transition::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdp() -> PeerEvent {
        PeerEvent::LocalDescription(SessionDescription::offer("v=0 offer"))
    }

    fn ice(n: u8) -> PeerEvent {
        PeerEvent::LocalCandidate(IceCandidate::new(format!("candidate:{n}")))
    }

    fn started(role: Role) -> Negotiation {
        let mut negotiation = Negotiation::new(SessionId::new(), role);
        assert_eq!(negotiation.begin(), Transition::None);
        negotiation
    }

    fn count_ready(negotiation: &mut Negotiation, events: Vec<PeerEvent>) -> usize {
        events
            .into_iter()
            .filter(|e| matches!(negotiation.apply(e.clone()), Transition::Ready(_)))
            .count()
    }

    #[test]
    fn test_ready_once_sdp_first() {
        let mut negotiation = started(Role::Offerer);
        let fired = count_ready(&mut negotiation, vec![sdp(), ice(1), ice(2), sdp()]);
        assert_eq!(fired, 1);
        assert_eq!(negotiation.state(), &NegotiationState::Ready);
    }

    #[test]
    fn test_ready_once_ice_first() {
        let mut negotiation = started(Role::Answerer);
        assert_eq!(negotiation.apply(ice(1)), Transition::None);
        let Transition::Ready(signal) = negotiation.apply(sdp()) else {
            panic!("expected ready");
        };
        assert_eq!(signal.session, negotiation.session());
        assert_eq!(signal.ice, IceCandidate::new("candidate:1"));
        assert_eq!(count_ready(&mut negotiation, vec![ice(2), sdp()]), 0);
    }

    #[test]
    fn test_first_candidate_wins() {
        let mut negotiation = started(Role::Offerer);
        negotiation.apply(ice(1));
        negotiation.apply(ice(2));
        assert_eq!(negotiation.local_ice(), Some(&IceCandidate::new("candidate:1")));
    }

    #[test]
    fn test_ready_waits_for_begin() {
        let mut negotiation = Negotiation::new(SessionId::new(), Role::Offerer);
        assert_eq!(negotiation.apply(sdp()), Transition::None);
        assert_eq!(negotiation.apply(ice(1)), Transition::None);
        assert!(matches!(negotiation.begin(), Transition::Ready(_)));
        assert_eq!(negotiation.begin(), Transition::None);
    }

    #[test]
    fn test_accept_answer_only_when_ready() {
        let mut offerer = started(Role::Offerer);
        assert!(offerer.accept_answer().is_err());
        count_ready(&mut offerer, vec![sdp(), ice(1)]);
        assert!(offerer.accept_answer().is_ok());
        assert!(offerer.accept_answer().is_err());

        let mut answerer = started(Role::Answerer);
        count_ready(&mut answerer, vec![sdp(), ice(1)]);
        assert!(answerer.accept_answer().is_err());
    }

    #[test]
    fn test_channel_lifecycle() {
        let mut negotiation = started(Role::Answerer);
        count_ready(&mut negotiation, vec![sdp(), ice(1)]);

        assert_eq!(negotiation.apply(PeerEvent::ChannelOpen), Transition::Open);
        assert_eq!(negotiation.state(), &NegotiationState::Connected);
        assert_eq!(negotiation.apply(PeerEvent::ChannelOpen), Transition::None);
        assert_eq!(
            negotiation.apply(PeerEvent::Message(Bytes::from_static(b"data"))),
            Transition::Received(Bytes::from_static(b"data"))
        );
        assert_eq!(negotiation.apply(PeerEvent::ChannelClosed), Transition::Closed);
        assert_eq!(negotiation.apply(PeerEvent::ChannelClosed), Transition::None);
        assert_eq!(negotiation.apply(PeerEvent::ChannelOpen), Transition::None);
    }

    #[test]
    fn test_failure_is_absorbing() {
        let mut negotiation = started(Role::Offerer);
        assert_eq!(
            negotiation.apply(PeerEvent::Failed("bad sdp".into())),
            Transition::Failed("bad sdp".into())
        );
        assert_eq!(count_ready(&mut negotiation, vec![sdp(), ice(1)]), 0);
        assert_eq!(negotiation.apply(PeerEvent::Failed("again".into())), Transition::None);
        assert!(negotiation.state().is_terminal());

        // A late close still lets the owner clean up.
        assert_eq!(negotiation.apply(PeerEvent::ChannelClosed), Transition::Closed);
    }
}
