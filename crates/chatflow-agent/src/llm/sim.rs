//! Deterministic offline model.
//!
//! [`SimModel`] needs no provider or API key.  It lets the binary and the
//! end-to-end tests exercise the full agent/tool loop:
//!
//! - A user message of the form `/call <tool> <json-args>` makes it declare
//!   one tool call (arguments default to `{}`).
//! - After tool results it summarises what the tools returned.
//! - Anything else is echoed back as `You said: <text>`.
//!
//! Replies are streamed word by word, optionally with a fixed delay between
//! chunks to mimic network latency.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::model::{ChatModel, ChunkStream};
use crate::llm::types::{ChatRequest, Message, ModelChunk, Role, ToolCall};

/// Prefix that turns a user message into a tool call.
pub const CALL_PREFIX: &str = "/call ";

/// A scripted, provider-free model.
#[derive(Debug, Clone)]
pub struct SimModel {
    model: String,
    chunk_delay: Duration,
}

impl Default for SimModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimModel {
    /// Create a simulation model with no streaming delay.
    pub fn new() -> Self {
        Self {
            model: "sim".to_owned(),
            chunk_delay: Duration::ZERO,
        }
    }

    /// Sleep for `delay` before every streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Decide the full reply for a prompt.
    fn respond(messages: &[Message]) -> Vec<ModelChunk> {
        let Some(last) = messages.last() else {
            return Vec::new();
        };

        match last.role {
            Role::User => match parse_call(&last.content) {
                Some(call) => vec![ModelChunk::ToolCall(call)],
                None => words(&format!("You said: {}", last.content)),
            },
            Role::Tool => words(&summarise_tool_results(messages)),
            Role::System | Role::Assistant => Vec::new(),
        }
    }
}

#[async_trait]
impl ChatModel for SimModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        let messages: Vec<Message> = request.messages.into_iter().map(|p| p.message).collect();
        let chunks = Self::respond(&messages);
        let delay = self.chunk_delay;

        tracing::trace!(chunks = chunks.len(), "sim model streaming reply");

        Ok(futures::stream::iter(chunks)
            .then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, AgentError>(chunk)
            })
            .boxed())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse `/call <tool> <json-args>`.
fn parse_call(content: &str) -> Option<ToolCall> {
    let rest = content.trim().strip_prefix(CALL_PREFIX)?.trim();
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }

    let arguments = if args.is_empty() {
        json!({})
    } else {
        serde_json::from_str(args).unwrap_or_else(|_| json!({ "input": args }))
    };

    Some(ToolCall::new(
        format!("call_{}", uuid::Uuid::now_v7().simple()),
        name,
        arguments,
    ))
}

/// Describe the trailing run of tool results.
fn summarise_tool_results(messages: &[Message]) -> String {
    let start = messages
        .iter()
        .rposition(|m| m.role != Role::Tool)
        .map_or(0, |i| i + 1);
    let calls: Vec<&ToolCall> = messages[..start]
        .last()
        .map(|m| m.tool_calls.iter().collect())
        .unwrap_or_default();

    let parts: Vec<String> = messages[start..]
        .iter()
        .map(|result| {
            let name = calls
                .iter()
                .find(|c| Some(c.id.as_str()) == result.tool_call_id.as_deref())
                .map_or("tool", |c| c.name.as_str());
            format!("{name} returned {}", result.content)
        })
        .collect();

    format!("The {}.", parts.join(", and the "))
}

/// Split text into word-sized chunks that concatenate back to the input.
fn words(text: &str) -> Vec<ModelChunk> {
    text.split_inclusive(' ')
        .map(|w| ModelChunk::Text(w.to_owned()))
        .collect()
}

/// Render a tool-call argument value for display.
pub fn describe_arguments(arguments: &Value) -> String {
    match arguments {
        Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
