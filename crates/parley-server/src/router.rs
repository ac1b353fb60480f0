use std::sync::Arc;

use chrono::Utc;
use parley_shared::{ConnectionId, EnvelopeKind, Recipient, RelayEnvelope, WireEnvelope};
use tokio::sync::mpsc;
use tracing::debug;

use crate::registry::ConnectionRegistry;

/// Stamps inbound envelopes and forwards them through the registry.
///
/// The payload is never interpreted: whatever `type` and `content` a client
/// sends reach the addressees unchanged.
///
/// Also synthesizes the `connect` / `disconnect` envelopes that mark each
/// connection's lifecycle; clients never send those themselves.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Accept a new client: assign a fresh ID, register it and announce it
    /// to everybody else.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<RelayEnvelope>) {
        let id = ConnectionId::generate();
        let rx = self.registry.register(id.clone()).await;

        let announced = self
            .registry
            .broadcast(
                &id,
                RelayEnvelope::synthetic(id.clone(), EnvelopeKind::Connect, Utc::now()),
            )
            .await;
        debug!(client = %id.short(), announced, "Announced new client");

        (id, rx)
    }

    /// Stamp and route an envelope received from `from`.
    ///
    /// Returns the number of clients it was delivered to.
    pub async fn route(&self, from: &ConnectionId, inbound: WireEnvelope) -> usize {
        let envelope = RelayEnvelope::stamp(from.clone(), inbound, Utc::now());
        self.route_envelope(envelope).await
    }

    pub async fn route_envelope(&self, envelope: RelayEnvelope) -> usize {
        let from = envelope.from.clone();
        let to = envelope.to.clone();
        let kind = envelope.kind.clone();

        let delivered = match &to {
            Recipient::All => self.registry.broadcast(&from, envelope).await,
            Recipient::Client(id) => usize::from(self.registry.unicast(id, envelope).await),
        };

        debug!(from = %from.short(), to = %to, kind = %kind, delivered, "Transit envelope");
        delivered
    }

    /// Announce a client's departure to the remaining clients, then forget it.
    pub async fn disconnect(&self, id: &ConnectionId) {
        let envelope = RelayEnvelope::synthetic(id.clone(), EnvelopeKind::Disconnect, Utc::now());
        self.registry.broadcast(id, envelope).await;
        self.registry.deregister(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::Body;
    use serde_json::json;

    fn router() -> MessageRouter {
        MessageRouter::new(Arc::new(ConnectionRegistry::new(32)))
    }

    fn wire(json: &str) -> WireEnvelope {
        WireEnvelope::from_json(json).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<RelayEnvelope>) -> Vec<RelayEnvelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    #[tokio::test]
    async fn test_connect_announces_to_others_only() {
        let router = router();
        let (a, mut a_rx) = router.connect().await;
        assert!(drain(&mut a_rx).is_empty());

        let (b, mut b_rx) = router.connect().await;
        let seen = drain(&mut a_rx);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, "connect");
        assert_eq!(seen[0].from, b);
        assert!(drain(&mut b_rx).is_empty());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_enter_reaches_others_with_server_stamp() {
        let router = router();
        let (a, _a_rx) = router.connect().await;
        let (_b, mut b_rx) = router.connect().await;

        let before = Utc::now();
        let delivered = router
            .route(&a, wire(r#"{"type":"enter","content":"Alice","from":"spoofed"}"#))
            .await;
        assert_eq!(delivered, 1);

        let env = b_rx.try_recv().unwrap();
        assert_eq!(env.from, a);
        assert!(env.time >= before);
        assert_eq!(env.decode().unwrap().body, Body::Enter("Alice".into()));
    }

    #[tokio::test]
    async fn test_broadcast_never_reaches_sender() {
        let router = router();
        let mut clients = Vec::new();
        for _ in 0..4 {
            clients.push(router.connect().await);
        }
        router.disconnect(&clients[1].0).await;
        let late = router.connect().await;
        clients.push(late);

        for (_, rx) in clients.iter_mut() {
            drain(rx);
        }

        for i in [0usize, 2, 3, 4] {
            let sender = clients[i].0.clone();
            router.route(&sender, wire(r#"{"content":"ping"}"#)).await;
            for (j, (id, rx)) in clients.iter_mut().enumerate() {
                let got = drain(rx);
                if j == i || j == 1 {
                    assert!(got.is_empty(), "client {id} must not receive");
                } else {
                    assert_eq!(got.len(), 1);
                    assert_eq!(got[0].from, sender);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_addressee() {
        let router = router();
        let (a, mut a_rx) = router.connect().await;
        let (b, mut b_rx) = router.connect().await;
        let (_c, mut c_rx) = router.connect().await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let raw = format!(r#"{{"to":"{b}","type":"hello","content":"Alice"}}"#);
        assert_eq!(router.route(&a, wire(&raw)).await, 1);

        assert_eq!(drain(&mut b_rx).len(), 1);
        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn test_unicast_to_unknown_is_dropped() {
        let router = router();
        let (a, _a_rx) = router.connect().await;
        let (_b, mut b_rx) = router.connect().await;

        let delivered = router
            .route(&a, wire(r#"{"to":"nobody","content":"x"}"#))
            .await;
        assert_eq!(delivered, 0);
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_notifies_remaining_clients() {
        let router = router();
        let (a, _a_rx) = router.connect().await;
        let (_b, mut b_rx) = router.connect().await;

        router.disconnect(&a).await;

        let env = b_rx.try_recv().unwrap();
        assert_eq!(env.kind, "disconnect");
        assert_eq!(env.from, a);
        assert!(!router.registry().contains(&a).await);

        let delivered = router
            .route(&router.registry().ids().await[0], wire(&format!(r#"{{"to":"{a}"}}"#)))
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_payloads_are_forwarded_unchanged() {
        let router = router();
        let (a, _a_rx) = router.connect().await;
        let (b, mut b_rx) = router.connect().await;

        let content = json!({"uuid": "u1", "session": "s1", "sdp": "sdp1", "ice": "ice1"});
        let raw = format!(r#"{{"to":"{b}","type":"search","content":{content}}}"#);
        assert_eq!(router.route(&a, wire(&raw)).await, 1);

        let search = b_rx.try_recv().unwrap();
        assert_eq!(search.from, a);
        assert_eq!(search.kind, "search");
        assert_eq!(search.content, content);

        let raw = format!(r#"{{"to":"{b}","type":"file"}}"#);
        assert_eq!(router.route(&a, wire(&raw)).await, 1);
        let file = b_rx.try_recv().unwrap();
        assert_eq!(file.kind, "file");
        assert_eq!(file.content, json!(""));

        assert_eq!(router.route(&a, wire(r#"{"type":"shout"}"#)).await, 1);
        assert_eq!(b_rx.try_recv().unwrap().kind, "shout");
    }
}
