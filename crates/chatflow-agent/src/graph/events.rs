//! Execution events produced while a run is in flight.
//!
//! Nodes report progress through an [`EventSink`].  The sink is the producer
//! half of a bounded channel; the consumer is the stream returned by the
//! executor.  When the consumer goes away the run is cancelled.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};

/// A low-level event of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// The run acquired its thread and is about to start.
    Started { thread_id: String },

    /// An incremental chunk of assistant text.
    Token { text: String },

    /// A tool call is about to run.
    ToolStarted {
        call_id: String,
        tool: String,
        input: Value,
    },

    /// A tool call finished.  Failures carry the error text as output.
    ToolFinished {
        call_id: String,
        tool: String,
        output: Value,
        is_error: bool,
    },

    /// The run ended with a terminal error.
    Failed { message: String },

    /// The run ended.  Always the last event.
    Finished,
}

/// Producer side of a run's event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<GraphEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Wrap `tx`; a closed receiver cancels `cancel`.
    pub fn new(tx: mpsc::Sender<GraphEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// The run's cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Deliver one event, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if the run was cancelled or the
    /// receiver is gone.
    pub async fn emit(&self, event: GraphEvent) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AgentError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| {
                self.cancel.cancel();
                AgentError::Cancelled
            }),
        }
    }
}
