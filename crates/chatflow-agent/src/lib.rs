//! Agent execution graph for Chatflow.
//!
//! This crate is the core of Chatflow: it runs a conversation between a user,
//! a streaming language model and a set of tools, and streams the unfolding
//! reply as typed protocol frames.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────────────┐   ┌──────────────┐
//! │  Checkpoint  │<─>│        GraphExecutor        │──>│   Protocol   │
//! │    Store     │   │  agent <──> tools (router)  │   │ (SSE frames) │
//! └──────────────┘   └──────┬───────────────┬──────┘   └──────────────┘
//!                           │               │
//!                 ┌─────────┴──────┐  ┌─────┴────────┐
//!                 │ trim + cache   │  │ ToolRegistry │
//!                 │ -> ChatModel   │  │ (adapters)   │
//!                 └────────────────┘  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Message types, the model capability, the offline model.
//! - [`tools`] -- Tool adapter trait and registry.
//! - [`trim`] -- History trimming before every model call.
//! - [`cache`] -- Prompt cache hints.
//! - [`graph`] -- State, router, nodes and the executor.
//! - [`checkpoint`] -- Per-thread conversation state.
//! - [`protocol`] -- Stream events, SSE encoding and decoding.
//! - [`config`] -- Executor configuration.
//! - [`error`] -- Agent error types.

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod protocol;
pub mod tools;
pub mod trim;

// Re-export the most commonly used types at the crate root.
pub use cache::apply_cache_hints;
pub use checkpoint::{CheckpointStore, ThreadCheckpoint, ThreadLease};
pub use config::{CheckpointConfig, GraphConfig};
pub use error::{AgentError, Result};
pub use graph::{
    ConversationState, GraphEvent, GraphExecutor, GraphRun, RouteDecision, RunRequest,
    RunSummary, route,
};
pub use llm::{
    ChatModel, ChatRequest, ChunkStream, Message, ModelChunk, PromptMessage, Role, SimModel,
    ToolCall, ToolDefinition,
};
pub use protocol::{
    DONE_FRAME, Frame, FrameDecoder, FrameEncoder, StreamEvent, decode_frames, encode_events,
    encode_frame, sse_frames,
};
pub use tools::{ToolAdapter, ToolRegistry};
pub use trim::{SizeCounter, TrimConfig, check_tool_pairing, trim_messages};
