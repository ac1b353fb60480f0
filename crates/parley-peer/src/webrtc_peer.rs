//! WebRTC implementation of [`PeerBackend`].
//!
//! Each session owns one `RTCPeerConnection` driven by its own task. The
//! backend only keeps a command sender per session; dropping it (on
//! [`PeerBackend::close`] or when the backend itself is dropped) ends the task
//! and closes the connection, even if negotiation is still in flight.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parley_shared::{IceCandidate, SdpKind, SessionDescription, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::backend::{PeerBackend, PeerEventSink, RemoteSignal};
use crate::config::PeerConfig;
use crate::error::PeerError;
use crate::negotiation::PeerEvent;

enum SlotCommand {
    ApplyAnswer(RemoteSignal),
    Send(Bytes),
}

enum Start {
    Offer,
    Answer(RemoteSignal),
}

pub struct WebRtcBackend {
    api: Arc<API>,
    config: PeerConfig,
    events: PeerEventSink,
    slots: HashMap<SessionId, mpsc::UnboundedSender<SlotCommand>>,
}

impl WebRtcBackend {
    pub fn new(config: PeerConfig, events: PeerEventSink) -> Result<Self, PeerError> {
        let mut media = MediaEngine::default();
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api: Arc::new(api),
            config,
            events,
            slots: HashMap::new(),
        })
    }

    /// Number of sessions with a live peer connection task.
    pub fn active(&self) -> usize {
        self.slots.len()
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = if self.config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    fn spawn(&mut self, session: SessionId, start: Start) -> Result<(), PeerError> {
        if self.slots.contains_key(&session) {
            return Err(PeerError::Negotiation(format!(
                "session {session} already has a peer connection"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.slots.insert(session, tx);

        let slot = PeerSlot {
            session,
            api: self.api.clone(),
            rtc_config: self.rtc_config(),
            label: self.config.channel_label.clone(),
            events: self.events.clone(),
        };
        tokio::spawn(slot.run(start, rx));
        Ok(())
    }

    fn command(&self, session: SessionId, command: SlotCommand) -> Result<(), PeerError> {
        let slot = self
            .slots
            .get(&session)
            .ok_or(PeerError::UnknownSession(session))?;
        slot.send(command).map_err(|_| {
            PeerError::Negotiation(format!("peer connection for {session} has stopped"))
        })
    }
}

impl PeerBackend for WebRtcBackend {
    fn start_offer(&mut self, session: SessionId) -> Result<(), PeerError> {
        self.spawn(session, Start::Offer)
    }

    fn start_answer(&mut self, session: SessionId, remote: RemoteSignal) -> Result<(), PeerError> {
        if !remote.sdp.is_offer() {
            return Err(PeerError::Negotiation(format!(
                "expected an offer, got {:?}",
                remote.sdp.kind
            )));
        }
        self.spawn(session, Start::Answer(remote))
    }

    fn apply_answer(&mut self, session: SessionId, remote: RemoteSignal) -> Result<(), PeerError> {
        self.command(session, SlotCommand::ApplyAnswer(remote))
    }

    fn send(&mut self, session: SessionId, payload: Bytes) -> Result<(), PeerError> {
        self.command(session, SlotCommand::Send(payload))
    }

    fn close(&mut self, session: SessionId) {
        if self.slots.remove(&session).is_some() {
            debug!(session = %session, "Closing peer connection");
        }
    }
}

/// One session's peer connection task.
struct PeerSlot {
    session: SessionId,
    api: Arc<API>,
    rtc_config: RTCConfiguration,
    label: String,
    events: PeerEventSink,
}

impl PeerSlot {
    async fn run(self, start: Start, mut commands: mpsc::UnboundedReceiver<SlotCommand>) {
        let pc = match self.api.new_peer_connection(self.rtc_config.clone()).await {
            Ok(pc) => Arc::new(pc),
            Err(e) => {
                warn!(session = %self.session, error = %e, "Failed to create peer connection");
                report(&self.events, self.session, PeerEvent::Failed(e.to_string()));
                return;
            }
        };

        if let Err(e) = self.drive(&pc, start, &mut commands).await {
            warn!(session = %self.session, error = %e, "Peer connection failed");
            report(&self.events, self.session, PeerEvent::Failed(e.to_string()));
        }

        if let Err(e) = pc.close().await {
            debug!(session = %self.session, error = %e, "Error closing peer connection");
        }
        debug!(session = %self.session, "Peer connection task finished");
    }

    async fn drive(
        &self,
        pc: &Arc<RTCPeerConnection>,
        start: Start,
        commands: &mut mpsc::UnboundedReceiver<SlotCommand>,
    ) -> Result<(), PeerError> {
        self.watch_connection(pc);

        let mut channel: Option<Arc<RTCDataChannel>> = None;
        let (remote_channel_tx, mut remote_channel) = mpsc::unbounded_channel();

        match start {
            Start::Offer => {
                let dc = pc
                    .create_data_channel(
                        &self.label,
                        Some(RTCDataChannelInit {
                            ordered: Some(false),
                            max_retransmits: Some(0),
                            ..Default::default()
                        }),
                    )
                    .await?;
                watch_channel(&self.events, self.session, &dc);
                channel = Some(dc);

                let offer = pc.create_offer(None).await?;
                let sdp = offer.sdp.clone();
                pc.set_local_description(offer).await?;
                report(
                    &self.events,
                    self.session,
                    PeerEvent::LocalDescription(SessionDescription::offer(sdp)),
                );
            }
            Start::Answer(remote) => {
                let events = self.events.clone();
                let session = self.session;
                pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                    watch_channel(&events, session, &dc);
                    let tx = remote_channel_tx.clone();
                    Box::pin(async move {
                        let _ = tx.send(dc);
                    })
                }));

                apply_remote(pc, remote).await?;
                let answer = pc.create_answer(None).await?;
                let sdp = answer.sdp.clone();
                pc.set_local_description(answer).await?;
                report(
                    &self.events,
                    self.session,
                    PeerEvent::LocalDescription(SessionDescription::answer(sdp)),
                );
            }
        }

        loop {
            // The remote channel is queued before it reports open, so it must
            // be taken before any `Send` that open triggered.
            tokio::select! {
                biased;
                Some(dc) = remote_channel.recv() => {
                    debug!(session = %self.session, label = %dc.label(), "Remote data channel");
                    channel = Some(dc);
                }
                command = commands.recv() => match command {
                    Some(SlotCommand::ApplyAnswer(remote)) => {
                        apply_remote(pc, remote).await?;
                    }
                    Some(SlotCommand::Send(payload)) => {
                        let dc = channel.as_ref().ok_or_else(|| {
                            PeerError::Negotiation("data channel not available".into())
                        })?;
                        let sent = dc.send(&payload).await?;
                        info!(session = %self.session, bytes = sent, "Data channel message sent");
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    fn watch_connection(&self, pc: &Arc<RTCPeerConnection>) {
        let events = self.events.clone();
        let session = self.session;
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                // `None` marks the end of gathering.
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => report(
                        &events,
                        session,
                        PeerEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                    ),
                    Err(e) => debug!(session = %session, error = %e, "Unusable local candidate"),
                }
            })
        }));

        let events = self.events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(session = %session, state = %state, "Peer connection state");
            if state == RTCPeerConnectionState::Failed {
                report(
                    &events,
                    session,
                    PeerEvent::Failed("peer connection failed".into()),
                );
            }
            Box::pin(async {})
        }));
    }
}

fn watch_channel(events: &PeerEventSink, session: SessionId, dc: &Arc<RTCDataChannel>) {
    let on_open = events.clone();
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            report(&on_open, session, PeerEvent::ChannelOpen);
        })
    }));

    let on_message = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = on_message.clone();
        Box::pin(async move {
            report(&events, session, PeerEvent::Message(msg.data));
        })
    }));

    let on_close = events.clone();
    dc.on_close(Box::new(move || {
        let events = on_close.clone();
        Box::pin(async move {
            report(&events, session, PeerEvent::ChannelClosed);
        })
    }));
}

async fn apply_remote(pc: &RTCPeerConnection, remote: RemoteSignal) -> Result<(), PeerError> {
    let description = match remote.sdp.kind {
        SdpKind::Offer => RTCSessionDescription::offer(remote.sdp.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(remote.sdp.sdp)?,
        other => {
            return Err(PeerError::Negotiation(format!(
                "unsupported remote description {other:?}"
            )))
        }
    };
    pc.set_remote_description(description).await?;
    pc.add_ice_candidate(RTCIceCandidateInit {
        candidate: remote.ice.candidate,
        sdp_mid: remote.ice.sdp_mid,
        sdp_mline_index: remote.ice.sdp_mline_index,
        username_fragment: remote.ice.username_fragment,
    })
    .await?;
    Ok(())
}

fn report(events: &PeerEventSink, session: SessionId, event: PeerEvent) {
    // The owner may already be gone; completions for it are moot.
    let _ = events.send((session, event));
}
