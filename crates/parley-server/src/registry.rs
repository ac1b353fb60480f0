use std::collections::HashMap;

use parley_shared::{ConnectionId, RelayEnvelope};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// All currently connected clients, addressable by connection ID.
///
/// Each client is represented by the sending half of its bounded outbound
/// queue. Delivery never blocks: an envelope for a client whose queue is
/// full or closed is dropped for that client only.
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ConnectionId, mpsc::Sender<RelayEnvelope>>>,
    queue_depth: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a client. Returns the receiver its writer task drains.
    pub async fn register(&self, id: ConnectionId) -> mpsc::Receiver<RelayEnvelope> {
        let (tx, rx) = mpsc::channel::<RelayEnvelope>(self.queue_depth);
        let mut clients = self.clients.write().await;
        clients.insert(id.clone(), tx);

        info!(client = %id.short(), clients = clients.len(), "Client registered");

        rx
    }

    pub async fn deregister(&self, id: &ConnectionId) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(id).is_some();
        if removed {
            info!(client = %id.short(), clients = clients.len(), "Client deregistered");
        }
        removed
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.clients.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// Deliver to exactly one client. Returns `false` when the client is not
    /// registered or its queue rejected the envelope.
    pub async fn unicast(&self, to: &ConnectionId, envelope: RelayEnvelope) -> bool {
        let clients = self.clients.read().await;
        match clients.get(to) {
            Some(tx) => deliver(to, tx, envelope),
            None => {
                debug!(target_client = %to.short(), "Dropping envelope for unknown client");
                false
            }
        }
    }

    /// Deliver to every registered client except `except`. Returns the
    /// number of clients that accepted the envelope.
    pub async fn broadcast(&self, except: &ConnectionId, envelope: RelayEnvelope) -> usize {
        let clients = self.clients.read().await;
        clients
            .iter()
            .filter(|(id, _)| *id != except)
            .filter(|(id, tx)| deliver(id, tx, envelope.clone()))
            .count()
    }
}

fn deliver(id: &ConnectionId, tx: &mpsc::Sender<RelayEnvelope>, envelope: RelayEnvelope) -> bool {
    match tx.try_send(envelope) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!(target_client = %id.short(), "Dropping envelope for slow client");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(target_client = %id.short(), "Dropping envelope for closing client");
            false
        }
    }
}
