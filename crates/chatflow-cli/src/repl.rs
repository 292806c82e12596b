//! Subcommand: `chatflow chat`: interactive terminal chat.
//!
//! Runs the execution graph in-process against the offline model and the
//! built-in tools; every line is one run on the same thread.

use std::io::{self, BufRead, Write as _};
use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::info;

use chatflow_agent::{Message, StreamEvent};

use crate::helpers::{build_executor, init_tracing, load_config, render_event};

/// Run the interactive chat loop on `thread`.
pub async fn cmd_chat(config_path: &Path, thread: &str) -> Result<()> {
    init_tracing("warn");

    let config = load_config(config_path)?;
    let executor = build_executor(config);
    info!(thread_id = %thread, tools = executor.tools().tool_count(), "local chat ready");

    println!();
    println!("  Chatflow v{}", env!("CARGO_PKG_VERSION"));
    println!("  Thread: {thread}");
    println!("  Type a message, `/call <tool> <json>` to run a tool, or 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("failed to flush stdout")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("failed to read input")?;
        if read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        let mut run = executor.run(thread, vec![Message::user(trimmed)]);
        while let Some(event) = run.next().await {
            render_event(&StreamEvent::from(event), &mut stdout)
                .context("failed to write output")?;
        }
    }

    println!("Goodbye.");
    Ok(())
}
