//! Subcommand: `chatflow send`: one message to a running server.

use std::io;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use serde_json::json;

use chatflow_agent::{Frame, FrameDecoder};

use crate::helpers::{init_tracing, render_event};

/// Post `message` to `url` and print the streamed reply.
pub async fn cmd_send(url: &str, chat_id: &str, message: &str) -> Result<()> {
    init_tracing("warn");

    let endpoint = format!("{}/api/chat", url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&json!({
            "messages": [],
            "newMessage": message,
            "chatId": chat_id,
        }))
        .send()
        .await
        .with_context(|| format!("failed to reach {endpoint}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("server returned {status}: {body}");
    }

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    let mut stdout = io::stdout();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("failed to read response stream")?;
        for frame in decoder.feed(&chunk).context("malformed frame from server")? {
            if let Frame::Event(event) = frame {
                render_event(&event, &mut stdout).context("failed to write output")?;
            }
        }
    }

    if !decoder.is_terminated() {
        bail!("stream ended before the [DONE] terminator");
    }
    Ok(())
}
