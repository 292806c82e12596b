//! CLI argument definitions for Chatflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chatflow -- a streaming tool-using chat agent.
#[derive(Parser)]
#[command(
    name = "chatflow",
    version,
    about = "Chatflow -- a streaming tool-using chat agent",
    long_about = "Runs a language-model agent that can call tools mid-conversation and \
                  streams its replies as server-sent events."
)]
pub struct Cli {
    /// Path to the executor configuration (TOML, or JSON with a .json
    /// extension).
    #[arg(long, short, global = true, default_value = "chatflow.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on.
        #[arg(long, short, default_value_t = 3000)]
        port: u16,
    },

    /// Chat with the agent in the terminal, without a server.
    Chat {
        /// Thread to append to.
        #[arg(long, short, default_value = "local")]
        thread: String,
    },

    /// Send one message to a running server and print the streamed reply.
    Send {
        /// Base URL of the server.
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,

        /// Thread to append to.
        #[arg(long, default_value = "cli")]
        chat_id: String,

        /// The message to send.
        message: String,
    },
}
