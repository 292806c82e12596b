//! Main web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, and starts
//! the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use chatflow_agent::GraphExecutor;

use crate::WebConfig;
use crate::api;
use crate::state::AppState;

/// The Chatflow web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server.
    ///
    /// # Arguments
    ///
    /// * `config` - Bind address and port configuration.
    /// * `executor` - The graph executor shared across all requests.
    pub fn new(config: WebConfig, executor: GraphExecutor) -> Self {
        let state = Arc::new(AppState::new(executor, config.clone()));
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any);

        Router::new()
            .route("/api/status", get(api::status))
            .route("/api/chat", post(api::chat))
            .route(
                "/api/threads/{id}",
                get(api::get_thread).delete(api::delete_thread),
            )
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "starting web server");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("web server stopped");
        Ok(())
    }

    /// Serve on an already bound listener until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting connections fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
