//! Core types for model interaction.
//!
//! These types model the data flowing between the execution graph and the
//! model capability.  They are provider-agnostic; whatever sits behind
//! [`super::ChatModel`] translates them into its own wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the model.  Older clients call this role `agent`.
    #[serde(alias = "agent")]
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

impl Role {
    /// Lowercase label used in logs and transcripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A single message in a conversation history.
///
/// Messages are never edited once appended to a conversation; ordering is
/// conversational time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// The textual content of the message.
    ///
    /// For [`Role::Tool`] messages this is the tool output (or an error
    /// string).  Assistant messages that only request tools may leave it
    /// empty.
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Which tool call this message answers (only for [`Role::Tool`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::assistant_with_calls(content, Vec::new())
    }

    /// Create an assistant message carrying text and tool calls.
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Whether this message requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether this message is the result of a tool call.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier used to correlate the result with this call.
    pub id: String,

    /// The name of the tool to invoke (must match a registered tool).
    pub name: String,

    /// Arguments as a JSON value.  The structure depends on the tool's schema.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A tool definition exposed to the model so it knows what tools are available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input parameters.
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// A message as handed to the model, with its reuse annotation.
///
/// The cache hint only affects provider-side cost; models are free to ignore
/// it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    /// The conversation message.
    #[serde(flatten)]
    pub message: Message,

    /// Whether the provider may cache the prompt prefix ending here.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cache_hint: bool,
}

impl PromptMessage {
    /// Wrap a message without a cache hint.
    pub fn plain(message: Message) -> Self {
        Self {
            message,
            cache_hint: false,
        }
    }
}

/// A full request to send to the model capability.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// The model identifier.
    pub model: String,

    /// The trimmed and annotated prompt.
    pub messages: Vec<PromptMessage>,

    /// Tool definitions the model may invoke.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate in this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Streaming output
// ---------------------------------------------------------------------------

/// One increment of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    /// A chunk of assistant text, in arrival order.
    Text(String),

    /// A fully assembled tool call declared by the model.
    ToolCall(ToolCall),
}
