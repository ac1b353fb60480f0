//! Per-connection signaling session.
//!
//! Each websocket gets a writer task draining the client's outbound queue
//! and a reader loop feeding the router. Frames that are not a JSON object
//! are logged and skipped; they never terminate the connection.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parley_shared::WireEnvelope;
use tracing::{debug, info, warn};

use crate::router::MessageRouter;

pub async fn handle_socket(socket: WebSocket, router: MessageRouter) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut outbound) = router.connect().await;

    info!(client = %id.short(), "Signaling session opened");

    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            let text = match envelope.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(client = %writer_id.short(), error = %e, "Failed to encode envelope");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!(client = %id.short(), "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(client = %id.short(), error = %e, "Websocket read error");
                break;
            }
        };

        let inbound = match WireEnvelope::from_json(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(client = %id.short(), error = %e, "Ignoring malformed envelope");
                continue;
            }
        };

        router.route(&id, inbound).await;
    }

    router.disconnect(&id).await;
    writer.abort();

    info!(client = %id.short(), "Signaling session closed");
}
