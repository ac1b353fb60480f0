//! # parley-server
//!
//! Signaling relay for Parley chat clients.
//!
//! - **ConnectionRegistry** holds every connected client's outbound queue
//! - **MessageRouter** stamps inbound envelopes with the sender's ID and the
//!   transit time, then fans them out (broadcast or unicast)
//! - **HTTP surface** (axum): the signaling websocket, a health check and
//!   static assets

pub mod api;
pub mod config;
pub mod registry;
pub mod router;
pub mod ws;

pub use api::{build_router, serve, serve_on, AppState};
pub use config::ServerConfig;
pub use registry::ConnectionRegistry;
pub use router::MessageRouter;
