//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers.  The executor owns the checkpoint store, so every handler sees
//! the same threads.

use chrono::{DateTime, Utc};

use chatflow_agent::GraphExecutor;

use crate::WebConfig;

/// Shared state accessible from every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runs the agent graph for every chat request.
    pub executor: GraphExecutor,

    /// Web server configuration.
    pub config: WebConfig,

    /// When the server state was created.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state for `executor`.
    pub fn new(executor: GraphExecutor, config: WebConfig) -> Self {
        Self {
            executor,
            config,
            started_at: Utc::now(),
        }
    }
}
