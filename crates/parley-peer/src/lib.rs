//! # parley-peer
//!
//! Client side of Parley: presence roster, chat dispatch and peer-to-peer
//! file transfer negotiated through the relay.
//!
//! - **Negotiation** is a pure state machine per transfer session
//! - **FileTransferCoordinator** turns its transitions into `search` / `find`
//!   envelopes and backend calls
//! - **PeerBackend** abstracts the peer connection; [`WebRtcBackend`] is the
//!   production transport
//! - **ChatClient** is the actor tying the relay websocket, the backend and
//!   the presentation layer together

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod files;
pub mod negotiation;
pub mod roster;
pub mod session;
pub mod transfer;
pub mod webrtc_peer;

#[cfg(test)]
mod test_support;

pub use backend::{event_channel, PeerBackend, PeerEventSink, PeerEventStream, RemoteSignal};
pub use client::{spawn_client, spawn_client_with_backend, ChatClient, ClientCommand, ClientHandle};
pub use config::{ClientConfig, PeerConfig};
pub use error::PeerError;
pub use events::{ClientEvent, TransferPhase};
pub use files::{FileRecord, FileSet};
pub use negotiation::{Negotiation, NegotiationState, PeerEvent, Role, Transition};
pub use roster::Roster;
pub use session::{Session, SessionTable};
pub use transfer::FileTransferCoordinator;
pub use webrtc_peer::WebRtcBackend;
