use chrono::{DateTime, Utc};
use parley_shared::{ConnectionId, FileAnnounce, FileId};

/// Progress of a file transfer as shown on the file's widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Download requested, offer being prepared
    Init,
    /// Offer sent to the publisher
    Searching,
    /// Answer applied, waiting for the content
    Receiving,
    /// Content pushed to a downloader
    Sending,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A client connected to the relay
    Joined { id: ConnectionId },
    /// A client left the chat or disconnected
    Left { id: ConnectionId, name: String },
    /// A participant introduced itself (`enter` or `hello`)
    Named { id: ConnectionId, name: String },
    Message {
        from: ConnectionId,
        name: String,
        time: DateTime<Utc>,
        text: String,
    },
    /// The local user's own message, echoed locally
    Sent { time: DateTime<Utc>, text: String },
    FileAnnounced {
        from: ConnectionId,
        name: String,
        file: FileAnnounce,
    },
    FilePublished { file: FileAnnounce },
    TransferPhase { file: FileId, phase: TransferPhase },
    FileReady { file: FileId },
    TransferFailed { file: FileId, reason: String },
}
