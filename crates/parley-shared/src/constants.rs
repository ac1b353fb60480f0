/// Application name
pub const APP_NAME: &str = "Parley";

/// Recipient sentinel addressing every connected client except the sender
pub const BROADCAST: &str = "all";

/// Path of the relay's signaling websocket
pub const SIGNAL_PATH: &str = "/ws";

/// Default HTTP port of the relay
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default depth of each client's outbound queue on the relay
pub const DEFAULT_CLIENT_QUEUE: usize = 256;

/// Label of the file-transfer data channel
pub const DATA_CHANNEL_LABEL: &str = "RTCDataChannel";

/// Largest file that fits in the single data channel message a transfer uses
pub const MAX_MESSAGE_SIZE: usize = 65_536;
