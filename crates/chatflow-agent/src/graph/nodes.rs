//! The two graph nodes: the agent turn and the tool invoker.
//!
//! Each node appends to the [`ConversationState`] it is given and reports
//! progress through the run's [`EventSink`].  Neither node touches the
//! checkpoint store; the executor decides what gets committed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cache::apply_cache_hints;
use crate::config::GraphConfig;
use crate::error::{AgentError, Result};
use crate::graph::events::{EventSink, GraphEvent};
use crate::graph::state::ConversationState;
use crate::llm::model::ChatModel;
use crate::llm::types::{ChatRequest, Message, ModelChunk, PromptMessage, ToolDefinition};
use crate::tools::ToolRegistry;
use crate::trim::{check_tool_pairing, trim_messages};

/// Name of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Produces one assistant message.
    Agent,
    /// Resolves the pending tool calls.
    Tools,
}

impl NodeId {
    /// Label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Tools => "tools",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Agent node
// ---------------------------------------------------------------------------

/// Runs one model turn and appends the assistant message.
#[derive(Clone)]
pub struct AgentNode {
    model: Arc<dyn ChatModel>,
    tool_definitions: Vec<ToolDefinition>,
    config: Arc<GraphConfig>,
}

impl AgentNode {
    /// Create an agent node offering `tool_definitions` to `model`.
    pub fn new(
        model: Arc<dyn ChatModel>,
        tool_definitions: Vec<ToolDefinition>,
        config: Arc<GraphConfig>,
    ) -> Self {
        Self {
            model,
            tool_definitions,
            config,
        }
    }

    /// Build the prompt for `messages`: system prompt, trimming, cache hints.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::TrimmingInvariant`] if the trimmed window breaks
    /// tool pairing.
    pub fn build_prompt(&self, messages: &[Message]) -> Result<Vec<PromptMessage>> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            full.push(Message::system(prompt.as_str()));
        }
        full.extend_from_slice(messages);

        let trimmed = trim_messages(&full, &self.config.trim);
        if let Err(e) = check_tool_pairing(&trimmed) {
            error!(error = %e, "trimmed history failed the tool pairing check");
            return Err(e);
        }

        Ok(apply_cache_hints(trimmed))
    }

    /// Run one turn against `state`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] when the run is cancelled, and a
    /// model error when the model fails or exceeds its timeout.
    pub async fn run(&self, state: &mut ConversationState, events: &EventSink) -> Result<()> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: self.build_prompt(&state.messages)?,
            tools: self.tool_definitions.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            model = self.model.model_id(),
            prompt_messages = request.messages.len(),
            "calling model"
        );

        let timeout = self.config.model_timeout();
        let message = tokio::select! {
            biased;
            () = events.cancel_token().cancelled() => return Err(AgentError::Cancelled),
            turn = tokio::time::timeout(timeout, self.stream_turn(request, events)) => {
                turn.map_err(|_| AgentError::ModelTimeout { secs: timeout.as_secs() })??
            }
        };

        debug!(
            chars = message.content.len(),
            tool_calls = message.tool_calls.len(),
            "model turn complete"
        );
        state.push(message);
        Ok(())
    }

    /// Consume the model stream, forwarding text as it arrives.
    async fn stream_turn(&self, request: ChatRequest, events: &EventSink) -> Result<Message> {
        let mut stream = self
            .model
            .stream(request)
            .await
            .map_err(into_model_error)?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk.map_err(into_model_error)? {
                ModelChunk::Text(delta) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    events.emit(GraphEvent::Token { text: delta }).await?;
                }
                ModelChunk::ToolCall(mut call) => {
                    if call.id.trim().is_empty() {
                        call.id = format!("call_{}", Uuid::now_v7().simple());
                    }
                    tool_calls.push(call);
                }
            }
        }

        Ok(Message::assistant_with_calls(text, tool_calls))
    }
}

/// Anything the model capability reports is a model invocation failure.
fn into_model_error(e: AgentError) -> AgentError {
    match e {
        AgentError::Cancelled
        | AgentError::ModelInvocation { .. }
        | AgentError::ModelTimeout { .. } => e,
        other => AgentError::ModelInvocation {
            reason: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tool node
// ---------------------------------------------------------------------------

/// Resolves the pending tool calls of the last assistant message.
#[derive(Debug, Clone)]
pub struct ToolNode {
    tools: ToolRegistry,
    timeout: Duration,
}

impl ToolNode {
    /// Create a tool node backed by `tools`.
    pub fn new(tools: ToolRegistry, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// Invoke every pending call in declaration order, one at a time.
    ///
    /// Tool failures become tool-result content.
    ///
    /// # Errors
    ///
    /// Only [`AgentError::Cancelled`].
    pub async fn run(&self, state: &mut ConversationState, events: &EventSink) -> Result<()> {
        let calls = state.pending_tool_calls().to_vec();

        for call in calls {
            events
                .emit(GraphEvent::ToolStarted {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    input: call.arguments.clone(),
                })
                .await?;

            let outcome = tokio::select! {
                biased;
                () = events.cancel_token().cancelled() => return Err(AgentError::Cancelled),
                result = tokio::time::timeout(
                    self.timeout,
                    self.tools.invoke(&call.name, call.arguments.clone()),
                ) => result.unwrap_or_else(|_| Err(AgentError::ToolTimeout {
                    tool_name: call.name.clone(),
                    secs: self.timeout.as_secs(),
                })),
            };

            let (content, is_error) = match outcome {
                Ok(output) => {
                    debug!(tool = %call.name, call_id = %call.id, "tool succeeded");
                    (output, false)
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "tool execution failed");
                    (format!("Error: {e}"), true)
                }
            };

            state.push(Message::tool_result(call.id.as_str(), content.as_str()));

            events
                .emit(GraphEvent::ToolFinished {
                    call_id: call.id,
                    tool: call.name,
                    output: Value::String(content),
                    is_error,
                })
                .await?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::llm::SimModel;
    use crate::llm::types::{Role, ToolCall};
    use crate::tools::ToolAdapter;
    use crate::trim::{SizeCounter, TrimConfig};

    struct Lookup;

    #[async_trait]
    impl ToolAdapter for Lookup {
        fn adapter_id(&self) -> &str {
            "lookup"
        }

        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "lookup".into(),
                description: "Look up a value".into(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn execute(&self, _tool_name: &str, arguments: Value) -> Result<String> {
            match arguments.get("x").and_then(Value::as_i64) {
                Some(1) => Ok("42".into()),
                _ => Err(AgentError::ToolExecutionFailed {
                    tool_name: "lookup".into(),
                    reason: "no such key".into(),
                }),
            }
        }
    }

    fn sink() -> (EventSink, mpsc::Receiver<GraphEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (EventSink::new(tx, CancellationToken::new()), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<GraphEvent>) -> Vec<GraphEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn agent(config: GraphConfig) -> AgentNode {
        AgentNode::new(Arc::new(SimModel::new()), Vec::new(), Arc::new(config))
    }

    #[test]
    fn prompt_starts_with_system_prompt_and_hints_last() {
        let node = agent(GraphConfig {
            system_prompt: Some("Be brief.".into()),
            ..GraphConfig::default()
        });
        let prompt = node.build_prompt(&[Message::user("hi")]).unwrap();
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].message.role, Role::System);
        assert!(prompt[1].cache_hint);
    }

    #[test]
    fn prompt_is_trimmed() {
        let node = agent(GraphConfig {
            trim: TrimConfig {
                max_units: 2,
                counter: SizeCounter::Messages,
            },
            ..GraphConfig::default()
        });
        let history = vec![
            Message::user("one"),
            Message::assistant("a"),
            Message::user("two"),
            Message::assistant("b"),
            Message::user("three"),
        ];
        let prompt = node.build_prompt(&history).unwrap();
        assert_eq!(prompt.len(), 1);
        assert_eq!(prompt[0].message.content, "three");
    }

    #[tokio::test]
    async fn agent_turn_appends_one_message_and_streams_tokens() {
        let (events, mut rx) = sink();
        let mut state = ConversationState::new(vec![Message::user("hello")]);
        agent(GraphConfig::default()).run(&mut state, &events).await.unwrap();

        assert_eq!(state.len(), 2);
        assert_eq!(state.messages[1], Message::assistant("You said: hello"));
        let tokens: String = drain(&mut rx)
            .into_iter()
            .map(|e| match e {
                GraphEvent::Token { text } => text,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(tokens, "You said: hello");
    }

    #[tokio::test]
    async fn tool_node_resolves_calls_in_order_and_recovers_failures() {
        let node = ToolNode::new(
            ToolRegistry::new().with_adapter(Arc::new(Lookup)),
            Duration::from_secs(5),
        );
        let (events, mut rx) = sink();
        let mut state = ConversationState::new(vec![
            Message::user("q"),
            Message::assistant_with_calls(
                "",
                vec![
                    ToolCall::new("c1", "lookup", json!({"x": 1})),
                    ToolCall::new("c2", "lookup", json!({"x": 2})),
                    ToolCall::new("c3", "missing", json!({})),
                ],
            ),
        ]);

        node.run(&mut state, &events).await.unwrap();

        assert_eq!(state.len(), 5);
        assert_eq!(state.messages[2], Message::tool_result("c1", "42"));
        assert!(state.messages[3].content.starts_with("Error: "));
        assert!(state.messages[4].content.contains("unknown tool"));
        assert!(check_tool_pairing(&state.messages).is_ok());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 6);
        assert!(matches!(
            &events[1],
            GraphEvent::ToolFinished { output, is_error: false, .. } if output == "42"
        ));
        assert!(matches!(&events[3], GraphEvent::ToolFinished { is_error: true, .. }));
    }
}
