//! CLI entry point for Chatflow.
//!
//! This binary provides the `chatflow` command with subcommands for serving
//! the HTTP API, chatting in the terminal, and sending a message to a running
//! server.

mod cli;
mod helpers;
mod repl;
mod send;
mod tools;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

use chatflow_web::{WebConfig, WebServer};

use crate::cli::{Cli, Commands};
use crate::helpers::{build_executor, init_tracing, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(&cli.config, bind, port).await,
        Commands::Chat { thread } => repl::cmd_chat(&cli.config, &thread).await,
        Commands::Send {
            url,
            chat_id,
            message,
        } => send::cmd_send(&url, &chat_id, &message).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: &std::path::Path, bind: String, port: u16) -> Result<()> {
    init_tracing("info");

    let config = load_config(config_path)?;
    let executor = build_executor(config);
    info!(
        tools = executor.tools().tool_count(),
        model = %executor.config().model,
        "executor ready"
    );

    let server = WebServer::new(
        WebConfig {
            bind_addr: bind,
            port,
        },
        executor,
    );
    println!("  Chatflow listening on http://{}", server.addr());

    server.start().await.map_err(|e| anyhow!("web server failed: {e}"))
}
