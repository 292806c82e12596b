//! The graph executor.
//!
//! Drives the agent and tool nodes through the router until the run
//! terminates, under a step budget.  Each run executes on its own task and
//! reports [`GraphEvent`]s through a bounded channel; the caller consumes
//! them as a [`GraphRun`] stream.
//!
//! Commit policy:
//!
//! - clean termination commits the final state;
//! - exceeding the step budget commits the state reached so far, minus any
//!   unanswered tool-call turn;
//! - model failures and cancellation never commit.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::GraphConfig;
use crate::error::{AgentError, Result};
use crate::graph::events::{EventSink, GraphEvent};
use crate::graph::nodes::{AgentNode, NodeId, ToolNode};
use crate::graph::router::route;
use crate::graph::state::ConversationState;
use crate::llm::model::ChatModel;
use crate::llm::types::{Message, Role};
use crate::tools::ToolRegistry;
use crate::trim::discard_broken_tool_results;

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Input of one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Thread the run belongs to.
    pub thread_id: String,

    /// Client-side history, used only when the thread has no checkpoint.
    pub history: Vec<Message>,

    /// Messages appended before the first agent turn.
    pub incoming: Vec<Message>,
}

impl RunRequest {
    /// A run appending `incoming` to `thread_id`.
    pub fn new(thread_id: impl Into<String>, incoming: Vec<Message>) -> Self {
        Self {
            thread_id: thread_id.into(),
            history: Vec::new(),
            incoming,
        }
    }

    /// Seed an unknown thread with `history`.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Thread the run belonged to.
    pub thread_id: String,

    /// Nodes executed.
    pub steps: u32,

    /// Messages in the committed state.
    pub messages: usize,
}

/// The event stream of one run.
///
/// Dropping it cancels the run.
pub struct GraphRun {
    events: ReceiverStream<GraphEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl GraphRun {
    /// Cancel the run.  No further events are produced.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the run was cancelled, by [`GraphRun::cancel`] or through the
    /// token passed to [`GraphExecutor::start`].
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for GraphRun {
    type Item = GraphEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs the agent/tool loop for any number of threads.
#[derive(Clone)]
pub struct GraphExecutor {
    agent: AgentNode,
    tool_node: ToolNode,
    tools: ToolRegistry,
    checkpoints: Arc<CheckpointStore>,
    config: Arc<GraphConfig>,
}

impl GraphExecutor {
    /// Create an executor.
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        checkpoints: Arc<CheckpointStore>,
        config: GraphConfig,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            agent: AgentNode::new(model, tools.definitions(), Arc::clone(&config)),
            tool_node: ToolNode::new(tools.clone(), config.tool_timeout()),
            tools,
            checkpoints,
            config,
        }
    }

    /// The executor's configuration.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The shared checkpoint store.
    pub fn checkpoints(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    /// The tools offered to the model.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Append `incoming` to `thread_id` and run the graph.
    pub fn run(&self, thread_id: impl Into<String>, incoming: Vec<Message>) -> GraphRun {
        self.start(RunRequest::new(thread_id, incoming), CancellationToken::new())
    }

    /// Start `request` on a new task.
    ///
    /// Cancelling `cancel`, or dropping the returned stream, aborts the run.
    pub fn start(&self, request: RunRequest, cancel: CancellationToken) -> GraphRun {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let events = EventSink::new(tx, cancel.clone());

        let executor = self.clone();
        tokio::spawn(async move { executor.drive(request, events).await });

        GraphRun {
            events: ReceiverStream::new(rx),
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Run to completion, translating the outcome into terminal events.
    async fn drive(self, request: RunRequest, events: EventSink) {
        let thread_id = request.thread_id.clone();

        if events
            .emit(GraphEvent::Started {
                thread_id: thread_id.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        match self.execute(request, &events).await {
            Ok(summary) => {
                info!(
                    thread_id = %summary.thread_id,
                    steps = summary.steps,
                    messages = summary.messages,
                    "run completed"
                );
                let _ = events.emit(GraphEvent::Finished).await;
            }
            Err(AgentError::Cancelled) => {
                info!(thread_id = %thread_id, "run cancelled");
            }
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "run failed");
                let failed = GraphEvent::Failed {
                    message: e.client_message(),
                };
                if events.emit(failed).await.is_ok() {
                    let _ = events.emit(GraphEvent::Finished).await;
                }
            }
        }
    }

    async fn execute(&self, request: RunRequest, events: &EventSink) -> Result<RunSummary> {
        let RunRequest {
            thread_id,
            history,
            incoming,
        } = request;

        let lease = tokio::select! {
            biased;
            () = events.cancel_token().cancelled() => return Err(AgentError::Cancelled),
            lease = self.checkpoints.lease(&thread_id) => lease,
        };

        let mut state = lease.state().clone();
        if state.is_empty() && !history.is_empty() {
            let seed: Vec<Message> = history
                .into_iter()
                .filter(|m| m.role != Role::System)
                .collect();
            state.extend(discard_broken_tool_results(&seed));
            debug!(thread_id = %thread_id, messages = state.len(), "seeded thread from request history");
        }
        state.extend(incoming);

        if state.is_empty() {
            return Err(AgentError::EmptyConversation { thread_id });
        }

        info!(thread_id = %thread_id, messages = state.len(), max_steps = self.config.max_steps, "run started");

        match self.run_loop(&thread_id, &mut state, events).await {
            Ok(steps) => {
                if events.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let messages = state.len();
                lease.commit(state);
                Ok(RunSummary {
                    thread_id,
                    steps,
                    messages,
                })
            }
            Err(e @ AgentError::StepBudgetExceeded { .. }) => {
                if events.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                lease.commit(state.without_unresolved_tail());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Alternate nodes until the router terminates.  Returns the step count.
    async fn run_loop(
        &self,
        thread_id: &str,
        state: &mut ConversationState,
        events: &EventSink,
    ) -> Result<u32> {
        let max_steps = self.config.max_steps;
        let mut current = NodeId::Agent;
        let mut steps = 0;

        loop {
            if steps >= max_steps {
                warn!(thread_id, max_steps, "step budget exhausted");
                return Err(AgentError::StepBudgetExceeded {
                    thread_id: thread_id.to_owned(),
                    max_steps,
                });
            }
            steps += 1;

            debug!(thread_id, step = steps, node = %current, "running node");
            match current {
                NodeId::Agent => self.agent.run(state, events).await?,
                NodeId::Tools => self.tool_node.run(state, events).await?,
            }

            let decision = route(state);
            debug!(thread_id, step = steps, decision = ?decision, "routed");
            match decision.next_node() {
                Some(next) => current = next,
                None => return Ok(steps),
            }
        }
    }
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("tools", &self.tools)
            .field("max_steps", &self.config.max_steps)
            .field("threads", &self.checkpoints.len())
            .finish()
    }
}
