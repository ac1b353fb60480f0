//! Chat client actor.
//!
//! One task owns the relay connection, the roster and the transfer
//! coordinator. Relay frames, peer transport completions and commands from
//! the presentation layer are processed strictly one at a time.

use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parley_shared::{Body, Envelope, FileId, OutboundEnvelope, RelayEnvelope, SessionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::backend::{event_channel, PeerBackend, PeerEventStream};
use crate::config::ClientConfig;
use crate::error::PeerError;
use crate::events::ClientEvent;
use crate::negotiation::PeerEvent;
use crate::roster::Roster;
use crate::transfer::FileTransferCoordinator;
use crate::webrtc_peer::WebRtcBackend;

/// Requests from the presentation layer.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Broadcast a chat line.
    Send(String),
    /// Load a local file and announce it.
    Publish { name: String, content: Bytes },
    /// Announce an already held file again.
    Share(FileId),
    /// Fetch an announced file from its publisher.
    Download(FileId),
    RemoveFile(FileId),
    /// Say goodbye and stop the client.
    Leave,
}

pub struct ChatClient<B> {
    name: String,
    roster: Roster,
    transfers: FileTransferCoordinator<B>,
    outbox: mpsc::UnboundedSender<OutboundEnvelope>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<B: PeerBackend> ChatClient<B> {
    pub fn new(
        name: impl Into<String>,
        backend: B,
        outbox: mpsc::UnboundedSender<OutboundEnvelope>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            roster: Roster::new(),
            transfers: FileTransferCoordinator::new(backend, outbox.clone(), events.clone()),
            outbox,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn transfers(&self) -> &FileTransferCoordinator<B> {
        &self.transfers
    }

    pub fn enter(&self) {
        self.send(OutboundEnvelope::broadcast(Body::Enter(self.name.clone())));
    }

    pub fn send_message(&self, text: impl Into<String>) {
        let text = text.into();
        self.send(OutboundEnvelope::broadcast(Body::Message(text.clone())));
        self.emit(ClientEvent::Sent {
            time: Utc::now(),
            text,
        });
    }

    pub fn leave(&mut self) {
        info!(name = %self.name, "Leaving chat");
        self.send(OutboundEnvelope::broadcast(Body::Leave));
        self.roster.clear();
    }

    /// Decode and dispatch one relay frame.
    ///
    /// The relay forwards payloads untouched, so an unknown `type` or a
    /// `content` that does not fit its type is ignored here.
    pub fn handle_frame(&mut self, text: &str) {
        let envelope = match RelayEnvelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };
        let from = envelope.from.clone();
        match envelope.decode() {
            Ok(envelope) => self.handle_envelope(envelope),
            Err(e) => debug!(from = %from.short(), error = %e, "Ignoring envelope with unusable payload"),
        }
    }

    pub fn handle_envelope(&mut self, envelope: Envelope) {
        // Resolve before the roster forgets a leaving participant.
        let name = self.roster.name_of(&envelope.from);
        self.roster.update(&envelope);

        let Envelope {
            from, time, body, ..
        } = envelope;

        match body {
            Body::Connect => self.emit(ClientEvent::Joined { id: from }),
            Body::Disconnect | Body::Leave => self.emit(ClientEvent::Left { id: from, name }),
            Body::Enter(name) => {
                self.send(OutboundEnvelope::unicast(
                    from.clone(),
                    Body::Hello(self.name.clone()),
                ));
                self.emit(ClientEvent::Named { id: from, name });
            }
            Body::Hello(name) => self.emit(ClientEvent::Named { id: from, name }),
            Body::Message(text) => self.emit(ClientEvent::Message {
                from,
                name,
                time,
                text,
            }),
            Body::File(file) => {
                self.transfers.on_announcement(&from, file.clone());
                self.emit(ClientEvent::FileAnnounced { from, name, file });
            }
            Body::Search(payload) => self.transfers.on_search(&from, payload),
            Body::Find(payload) => self.transfers.on_find(&from, payload),
        }
    }

    pub fn handle_peer_event(&mut self, session: SessionId, event: PeerEvent) {
        self.transfers.handle_peer_event(session, event);
    }

    pub fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Send(text) => self.send_message(text),
            ClientCommand::Publish { name, content } => {
                self.transfers.publish(name, content);
            }
            ClientCommand::Share(id) => {
                if let Err(e) = self.transfers.share(id) {
                    warn!(file = %id, error = %e, "Cannot share file");
                }
            }
            ClientCommand::Download(id) => {
                if let Err(e) = self.transfers.request_download(id) {
                    warn!(file = %id, error = %e, "Cannot download file");
                }
            }
            ClientCommand::RemoveFile(id) => {
                self.transfers.remove_file(id);
            }
            ClientCommand::Leave => self.leave(),
        }
    }

    fn send(&self, envelope: OutboundEnvelope) {
        if self.outbox.send(envelope).is_err() {
            debug!("Relay writer gone, dropping envelope");
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

pub type ClientHandle = (
    mpsc::UnboundedSender<ClientCommand>,
    mpsc::UnboundedReceiver<ClientEvent>,
    JoinHandle<Result<(), PeerError>>,
);

/// Connect to the relay with the WebRTC transport.
pub fn spawn_client(config: ClientConfig) -> Result<ClientHandle, PeerError> {
    let (sink, stream) = event_channel();
    let backend = WebRtcBackend::new(config.peer.clone(), sink)?;
    Ok(spawn_client_with_backend(config, backend, stream))
}

/// Connect to the relay with any peer transport. `peer_events` must be the
/// stream the backend reports into.
pub fn spawn_client_with_backend<B>(
    config: ClientConfig,
    backend: B,
    peer_events: PeerEventStream,
) -> ClientHandle
where
    B: PeerBackend + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(run_client(config, backend, peer_events, cmd_rx, event_tx));
    (cmd_tx, event_rx, handle)
}

async fn run_client<B: PeerBackend>(
    config: ClientConfig,
    backend: B,
    mut peer_events: PeerEventStream,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,
) -> Result<(), PeerError> {
    let (ws_stream, _) = connect_async(config.relay_url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();
    info!(relay = %config.relay_url, name = %config.name, "Connected to relay");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundEnvelope>();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let json = match envelope.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to encode envelope");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json)).await {
                warn!(error = %e, "Relay send failed");
                break;
            }
        }
        let _ = write.close().await;
    });

    let mut client = ChatClient::new(config.name, backend, out_tx, events);
    client.enter();

    let result = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => client.handle_frame(&text),
                Some(Ok(Message::Binary(bin))) => match String::from_utf8(bin) {
                    Ok(text) => client.handle_frame(&text),
                    Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay closed the connection");
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(PeerError::from(e)),
            },
            Some((session, event)) = peer_events.recv() => {
                client.handle_peer_event(session, event);
            }
            command = commands.recv() => match command {
                Some(ClientCommand::Leave) | None => {
                    client.leave();
                    break Ok(());
                }
                Some(command) => client.handle_command(command),
            },
        }
    };

    // Dropping the client closes the outbox; the writer flushes and exits.
    drop(client);
    let _ = writer.await;
    result
}
