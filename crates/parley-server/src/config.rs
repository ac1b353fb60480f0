//! Relay configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use parley_shared::constants::{DEFAULT_CLIENT_QUEUE, DEFAULT_HTTP_PORT};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface the listener binds to.
    /// Env: `BIND_ADDR`
    /// Default: `0.0.0.0`
    pub bind_addr: IpAddr,

    /// Port of the single listener (signaling websocket + static assets).
    /// Env: `PORT`
    /// Default: `8080`
    pub port: u16,

    /// Directory of static assets served on every non-signaling path.
    /// Env: `STATIC_DIR`
    /// Default: `./public`
    pub static_dir: PathBuf,

    /// Depth of each client's outbound queue. Envelopes for a client whose
    /// queue is full are dropped.
    /// Env: `CLIENT_QUEUE`
    /// Default: `256`
    pub client_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_HTTP_PORT,
            static_dir: PathBuf::from("./public"),
            client_queue: DEFAULT_CLIENT_QUEUE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            match addr.parse::<IpAddr>() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid BIND_ADDR, using default"),
            }
        }

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, using default"),
            }
        }

        if let Some(dir) = lookup("STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }

        if let Some(depth) = lookup("CLIENT_QUEUE") {
            match depth.parse::<usize>() {
                Ok(n) if n > 0 => config.client_queue = n,
                _ => tracing::warn!(value = %depth, "Invalid CLIENT_QUEUE, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}
