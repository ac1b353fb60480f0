use std::collections::HashMap;

use parley_shared::{ConnectionId, FileId, SessionId};
use tracing::debug;

use crate::negotiation::{Negotiation, PeerEvent, Transition};

/// One in-flight negotiation plus what it is transferring and with whom.
#[derive(Debug, Clone)]
pub struct Session {
    pub negotiation: Negotiation,
    pub file: FileId,
    pub peer: ConnectionId,
}

/// In-flight negotiation sessions keyed by session ID.
///
/// Removing a session is always safe: completions that arrive for it
/// afterwards are reported as unknown and dropped by the caller.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Returns `false` (and keeps the existing one) when
    /// the ID is already taken.
    pub fn insert(&mut self, session: Session) -> bool {
        let id = session.negotiation.session();
        if self.sessions.contains_key(&id) {
            return false;
        }
        self.sessions.insert(id, session);
        true
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(id);
        if removed.is_some() {
            debug!(session = %id, remaining = self.sessions.len(), "Session removed");
        }
        removed
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions currently bound to `file`.
    pub fn for_file(&self, file: &FileId) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.file == *file)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Feed a completion into its session. `None` means the session is
    /// unknown (never created or already removed).
    pub fn apply(&mut self, id: &SessionId, event: PeerEvent) -> Option<Transition> {
        match self.sessions.get_mut(id) {
            Some(session) => Some(session.negotiation.apply(event)),
            None => {
                debug!(session = %id, "Dropping event for unknown session");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::{NegotiationState, Role};
    use parley_shared::{IceCandidate, SessionDescription};

    fn session(role: Role) -> Session {
        let mut negotiation = Negotiation::new(SessionId::new(), role);
        negotiation.begin();
        Session {
            negotiation,
            file: FileId::new(),
            peer: ConnectionId::from("peer"),
        }
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut table = SessionTable::new();
        let first = session(Role::Answerer);
        assert!(table.insert(first.clone()));
        assert!(!table.insert(first));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_completion_after_removal_is_noop() {
        let mut table = SessionTable::new();
        let s = session(Role::Offerer);
        let id = s.negotiation.session();
        table.insert(s);

        table.apply(
            &id,
            PeerEvent::LocalDescription(SessionDescription::offer("v=0")),
        );
        assert!(table.remove(&id).is_some());

        assert_eq!(
            table.apply(&id, PeerEvent::LocalCandidate(IceCandidate::new("c"))),
            None
        );
        assert!(table.remove(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_apply_routes_to_session() {
        let mut table = SessionTable::new();
        let s = session(Role::Offerer);
        let id = s.negotiation.session();
        let file = s.file;
        table.insert(s);

        table.apply(&id, PeerEvent::LocalCandidate(IceCandidate::new("c")));
        let transition = table.apply(
            &id,
            PeerEvent::LocalDescription(SessionDescription::offer("v=0")),
        );
        assert!(matches!(transition, Some(Transition::Ready(_))));
        assert_eq!(
            table.get(&id).unwrap().negotiation.state(),
            &NegotiationState::Ready
        );
        assert_eq!(table.for_file(&file), vec![id]);
    }
}
