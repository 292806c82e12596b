//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].  The variants
//! fall into three propagation classes:
//!
//! - **Recoverable** -- tool failures ([`AgentError::ToolExecutionFailed`],
//!   [`AgentError::UnknownTool`], [`AgentError::ToolTimeout`]) are turned into
//!   tool-result content so the model can react to them.
//! - **Terminal for the run** -- model failures and the step budget end the
//!   current stream with an `error` frame, but never touch the checkpoint.
//! - **Silent** -- [`AgentError::Cancelled`] aborts the run without emitting
//!   anything further.

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Model errors --------------------------------------------------------
    /// The model capability failed to produce a response.
    #[error("model invocation failed: {reason}")]
    ModelInvocation { reason: String },

    /// The model did not finish its turn within the configured timeout.
    #[error("model invocation timed out after {secs}s")]
    ModelTimeout { secs: u64 },

    // -- Tool errors ---------------------------------------------------------
    /// A tool call referenced by the model does not exist in the registry.
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    /// A tool invocation failed.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    /// A tool did not complete within the configured timeout.
    #[error("tool `{tool_name}` timed out after {secs}s")]
    ToolTimeout { tool_name: String, secs: u64 },

    // -- Graph errors --------------------------------------------------------
    /// The trimmed history broke the tool-pairing invariant.  This is an
    /// internal bug and is never shown verbatim to clients.
    #[error("trimmed history violates tool pairing at index {index}: {reason}")]
    TrimmingInvariant { index: usize, reason: String },

    /// The agent/tool loop ran more nodes than the configured cap.
    #[error("step budget exceeded: more than {max_steps} steps for thread {thread_id}")]
    StepBudgetExceeded { thread_id: String, max_steps: u32 },

    /// The run had no messages to respond to.
    #[error("thread {thread_id} has no messages to respond to")]
    EmptyConversation { thread_id: String },

    /// The caller went away or cancelled the run.
    #[error("run cancelled")]
    Cancelled,

    // -- Protocol errors -----------------------------------------------------
    /// A streamed frame could not be decoded.
    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization failed.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AgentError {
    /// The message placed in the `error` frame sent to the client.
    ///
    /// Internal invariant violations are replaced by a generic message; the
    /// details only go to the log.
    pub fn client_message(&self) -> String {
        match self {
            Self::TrimmingInvariant { .. } => {
                "internal error while preparing the conversation".to_owned()
            }
            other => other.to_string(),
        }
    }
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_details_are_hidden_from_clients() {
        let err = AgentError::TrimmingInvariant {
            index: 4,
            reason: "orphaned tool result".into(),
        };
        assert!(!err.client_message().contains("orphaned"));

        let err = AgentError::ModelTimeout { secs: 5 };
        assert_eq!(err.client_message(), "model invocation timed out after 5s");
    }
}
