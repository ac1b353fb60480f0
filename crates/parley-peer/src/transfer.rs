//! File transfer coordination.
//!
//! Each transfer is driven by exactly one negotiation session. The
//! downloader is always the offerer: it creates the data channel and sends
//! `search`. The publisher answers with `find` and pushes the whole file as a
//! single message once the channel opens.

use std::collections::HashMap;

use bytes::Bytes;
use parley_shared::constants::MAX_MESSAGE_SIZE;
use parley_shared::{Body, ConnectionId, FileAnnounce, FileId, OutboundEnvelope, SessionId, SignalPayload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{PeerBackend, RemoteSignal};
use crate::error::PeerError;
use crate::events::{ClientEvent, TransferPhase};
use crate::files::{FileRecord, FileSet};
use crate::negotiation::{Negotiation, PeerEvent, Role, Transition};
use crate::session::{Session, SessionTable};

pub struct FileTransferCoordinator<B> {
    backend: B,
    files: FileSet,
    sessions: SessionTable,
    /// Publisher and metadata of every file announced to us
    announcements: HashMap<FileId, (ConnectionId, FileAnnounce)>,
    outbox: mpsc::UnboundedSender<OutboundEnvelope>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<B: PeerBackend> FileTransferCoordinator<B> {
    pub fn new(
        backend: B,
        outbox: mpsc::UnboundedSender<OutboundEnvelope>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            backend,
            files: FileSet::new(),
            sessions: SessionTable::new(),
            announcements: HashMap::new(),
            outbox,
            events,
        }
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn announcement(&self, id: &FileId) -> Option<&FileAnnounce> {
        self.announcements.get(id).map(|(_, announce)| announce)
    }

    // -----------------------------------------------------------------------
    // Uploader side
    // -----------------------------------------------------------------------

    /// Load a local file and announce it to every participant.
    pub fn publish(&mut self, name: impl Into<String>, content: Bytes) -> FileId {
        let record = FileRecord::local(name, content);
        let announce = record.announce();
        let id = self.files.insert(record);

        info!(file = %id, name = %announce.name, size = announce.size, "Publishing file");
        if announce.size > MAX_MESSAGE_SIZE as u64 {
            warn!(file = %id, size = announce.size, max = MAX_MESSAGE_SIZE, "File too large to transfer");
        }

        self.broadcast_announce(announce);
        id
    }

    pub fn publish_many<I, N>(&mut self, files: I) -> Vec<FileId>
    where
        I: IntoIterator<Item = (N, Bytes)>,
        N: Into<String>,
    {
        files
            .into_iter()
            .map(|(name, content)| self.publish(name, content))
            .collect()
    }

    /// Announce an already held file again.
    pub fn share(&mut self, id: FileId) -> Result<(), PeerError> {
        let record = self.files.get(&id).ok_or(PeerError::UnknownFile(id))?;
        if !record.is_ready() {
            return Err(PeerError::FileNotReady(id));
        }
        let announce = record.announce();
        self.broadcast_announce(announce);
        Ok(())
    }

    fn broadcast_announce(&mut self, announce: FileAnnounce) {
        self.send(OutboundEnvelope::broadcast(Body::File(announce.clone())));
        self.emit(ClientEvent::FilePublished { file: announce });
    }

    /// A downloader asked for one of our files.
    pub fn on_search(&mut self, from: &ConnectionId, payload: SignalPayload) {
        match self.files.get(&payload.uuid) {
            Some(record) if record.is_ready() => {}
            _ => {
                debug!(file = %payload.uuid, from = %from.short(), "Ignoring search for a file we do not hold");
                return;
            }
        }
        if self.sessions.contains(&payload.session) {
            debug!(session = %payload.session, "Ignoring search for an existing session");
            return;
        }

        let session = payload.session;
        let mut negotiation = Negotiation::new(session, Role::Answerer);
        negotiation.begin();
        self.sessions.insert(Session {
            negotiation,
            file: payload.uuid,
            peer: from.clone(),
        });

        debug!(session = %session, file = %payload.uuid, from = %from.short(), "Answering search");

        if let Err(e) = self.backend.start_answer(session, RemoteSignal::from(&payload)) {
            self.fail(session, e.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Downloader side
    // -----------------------------------------------------------------------

    /// Remember a publication so it can be downloaded later.
    pub fn on_announcement(&mut self, from: &ConnectionId, announce: FileAnnounce) {
        self.announcements
            .insert(announce.uuid, (from.clone(), announce));
    }

    /// Start fetching an announced file.
    ///
    /// Returns `None` when the file is already held locally.
    pub fn request_download(&mut self, id: FileId) -> Result<Option<SessionId>, PeerError> {
        if self.files.get(&id).is_some_and(FileRecord::is_ready) {
            debug!(file = %id, "File already present, not downloading");
            return Ok(None);
        }
        if !self.sessions.for_file(&id).is_empty() {
            debug!(file = %id, "Download already in progress");
            return Ok(None);
        }
        let (publisher, announce) = self
            .announcements
            .get(&id)
            .cloned()
            .ok_or(PeerError::UnknownFile(id))?;

        self.files.insert(FileRecord::remote(&announce));

        let session = SessionId::new();
        let mut negotiation = Negotiation::new(session, Role::Offerer);
        negotiation.begin();
        self.sessions.insert(Session {
            negotiation,
            file: id,
            peer: publisher.clone(),
        });
        self.phase(id, TransferPhase::Init);

        info!(file = %id, session = %session, publisher = %publisher.short(), "Requesting download");

        if let Err(e) = self.backend.start_offer(session) {
            self.fail(session, e.to_string());
            return Err(e);
        }
        Ok(Some(session))
    }

    /// The publisher answered our search.
    pub fn on_find(&mut self, from: &ConnectionId, payload: SignalPayload) {
        let Some(session) = self.sessions.get_mut(&payload.session) else {
            debug!(session = %payload.session, "Ignoring find for unknown session");
            return;
        };
        if session.file != payload.uuid
            || session.peer != *from
            || session.negotiation.role() != Role::Offerer
        {
            debug!(session = %payload.session, from = %from.short(), "Ignoring mismatched find");
            return;
        }
        if let Err(e) = session.negotiation.accept_answer() {
            debug!(session = %payload.session, error = %e, "Ignoring find");
            return;
        }

        self.phase(payload.uuid, TransferPhase::Receiving);

        if let Err(e) = self
            .backend
            .apply_answer(payload.session, RemoteSignal::from(&payload))
        {
            self.fail(payload.session, e.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Completions
    // -----------------------------------------------------------------------

    /// Single entry point for everything the backend reports.
    pub fn handle_peer_event(&mut self, id: SessionId, event: PeerEvent) {
        let Some(transition) = self.sessions.apply(&id, event) else {
            return;
        };
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let file = session.file;
        let peer = session.peer.clone();
        let role = session.negotiation.role();

        match transition {
            Transition::None => {}
            Transition::Ready(signal) => {
                let payload = signal.into_payload(file);
                let body = match role {
                    Role::Offerer => Body::Search(payload),
                    Role::Answerer => Body::Find(payload),
                };
                self.send(OutboundEnvelope::unicast(peer, body));
                if role == Role::Offerer {
                    self.phase(file, TransferPhase::Searching);
                }
            }
            Transition::Open => {
                if role == Role::Answerer {
                    self.push_content(id, file);
                }
            }
            Transition::Received(data) => {
                if role != Role::Offerer {
                    debug!(session = %id, "Ignoring message on uploading session");
                    return;
                }
                let stored = self
                    .files
                    .get_mut(&file)
                    .map(|record| record.set_content(data))
                    .is_some();
                if stored {
                    info!(file = %file, session = %id, "File received");
                    self.emit(ClientEvent::FileReady { file });
                }
                self.remove_session(id);
            }
            Transition::Closed => {
                self.remove_session(id);
            }
            Transition::Failed(reason) => {
                self.fail(id, reason);
            }
        }
    }

    fn push_content(&mut self, id: SessionId, file: FileId) {
        let Some(content) = self.files.get(&file).and_then(|r| r.content()).cloned() else {
            debug!(session = %id, file = %file, "File vanished before the channel opened");
            self.remove_session(id);
            return;
        };

        if content.len() > MAX_MESSAGE_SIZE {
            self.fail(
                id,
                format!("file of {} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit", content.len()),
            );
            return;
        }

        self.phase(file, TransferPhase::Sending);
        info!(file = %file, session = %id, bytes = content.len(), "Sending file");

        if let Err(e) = self.backend.send(id, content) {
            self.fail(id, e.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Drop a session and close its transport. Safe while negotiation is in
    /// flight; later completions for it are ignored.
    pub fn remove_session(&mut self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        self.backend.close(id);
        removed
    }

    /// Drop a file, its content, and any session transferring it.
    pub fn remove_file(&mut self, id: FileId) -> bool {
        for session in self.sessions.for_file(&id) {
            self.remove_session(session);
        }
        self.files.remove(&id).is_some()
    }

    fn fail(&mut self, id: SessionId, reason: String) {
        if let Some(session) = self.sessions.remove(&id) {
            warn!(session = %id, file = %session.file, reason = %reason, "Transfer failed");
            self.emit(ClientEvent::TransferFailed {
                file: session.file,
                reason,
            });
        }
        self.backend.close(id);
    }

    fn phase(&self, file: FileId, phase: TransferPhase) {
        self.emit(ClientEvent::TransferPhase { file, phase });
    }

    fn send(&self, envelope: OutboundEnvelope) {
        if self.outbox.send(envelope).is_err() {
            debug!("Outbox closed, dropping envelope");
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
