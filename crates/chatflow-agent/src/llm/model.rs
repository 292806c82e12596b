//! The model capability consumed by the agent node.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::llm::types::{ChatRequest, ModelChunk};

/// Incremental model output, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<ModelChunk>>;

/// A language model that streams its reply.
///
/// Implementations yield [`ModelChunk::Text`] increments as they arrive and
/// declare tool calls with [`ModelChunk::ToolCall`] once their arguments are
/// complete.  The stream ending marks the end of the assistant turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier used in logs.
    fn model_id(&self) -> &str;

    /// Start a streaming completion for `request`.
    ///
    /// Failing here, or yielding an `Err` item, aborts the run.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream>;
}
