//! Web interface for Chatflow.
//!
//! This crate exposes the agent execution graph over HTTP:
//!
//! - `POST /api/chat` runs one turn and streams the reply as server-sent
//!   events in the Chatflow protocol.
//! - `GET /api/threads/{id}` and `DELETE /api/threads/{id}` inspect and
//!   forget checkpointed threads.
//! - `GET /api/status` reports version, thread count and tool count.

pub mod api;
pub mod server;
pub mod state;

pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
        }
    }
}
