//! Client configuration.

use parley_shared::constants::DATA_CHANNEL_LABEL;

/// Peer transport settings.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// STUN/TURN URLs handed to every peer connection.
    /// Env: `PARLEY_ICE_SERVERS` (comma separated)
    /// Default: none, host candidates only
    pub ice_servers: Vec<String>,

    /// Label of the data channel created by the downloader.
    pub channel_label: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            channel_label: DATA_CHANNEL_LABEL.to_string(),
        }
    }
}

impl PeerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(servers) = lookup("PARLEY_ICE_SERVERS") {
            config.ice_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        config
    }
}

/// Everything a chat client needs to join a relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Websocket URL of the relay, e.g. `ws://127.0.0.1:8080/ws`
    pub relay_url: String,
    /// Display name announced with `enter` and `hello`
    pub name: String,
    pub peer: PeerConfig,
}

impl ClientConfig {
    /// Peer settings are read from the environment.
    pub fn new(relay_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            name: name.into(),
            peer: PeerConfig::from_env(),
        }
    }
}
