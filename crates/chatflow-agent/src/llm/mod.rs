//! Model integration layer.
//!
//! The execution graph talks to a language model only through the
//! [`ChatModel`] trait.  This module is organized into:
//!
//! - [`types`] -- Core data types (messages, tool calls, prompt, chunks).
//! - [`model`] -- The streaming model capability trait.
//! - [`sim`] -- A deterministic offline model for local runs and tests.

pub mod model;
pub mod sim;
pub mod types;

// Re-export the most commonly used types for convenience.
pub use model::{ChatModel, ChunkStream};
pub use sim::SimModel;
pub use types::{
    ChatRequest, Message, ModelChunk, PromptMessage, Role, ToolCall, ToolDefinition,
};
