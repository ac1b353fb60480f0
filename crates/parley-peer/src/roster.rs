//! Presence projection of the envelope stream.
//!
//! The roster never talks to the relay; it only folds the envelopes it is
//! shown into a map of connection ID to display name.

use std::collections::HashMap;

use parley_shared::{Body, ConnectionId, Envelope};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: HashMap<ConnectionId, String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one envelope into the roster.
    ///
    /// `enter` and `hello` set (or overwrite) the sender's name; `leave` and
    /// `disconnect` drop the sender. Everything else is ignored.
    pub fn update(&mut self, envelope: &Envelope) {
        match &envelope.body {
            Body::Enter(name) | Body::Hello(name) => {
                debug!(participant = %envelope.from.short(), name = %name, "Roster entry set");
                self.names.insert(envelope.from.clone(), name.clone());
            }
            Body::Leave | Body::Disconnect => {
                if self.names.remove(&envelope.from).is_some() {
                    debug!(participant = %envelope.from.short(), "Roster entry removed");
                }
            }
            _ => {}
        }
    }

    /// Display name of `id`, or the raw ID when the participant never
    /// introduced itself.
    pub fn name_of(&self, id: &ConnectionId) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.names.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &str)> {
        self.names.iter().map(|(id, name)| (id, name.as_str()))
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}
