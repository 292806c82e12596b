//! The routing decision taken after every node.

use serde::Serialize;

use crate::graph::nodes::NodeId;
use crate::graph::state::ConversationState;

/// Where the executor goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDecision {
    /// Run the pending tool calls.
    Tools,
    /// Let the agent react to tool output.
    Agent,
    /// The run is complete.
    Terminate,
}

impl RouteDecision {
    /// The node to run next, or `None` on termination.
    pub fn next_node(self) -> Option<NodeId> {
        match self {
            Self::Tools => Some(NodeId::Tools),
            Self::Agent => Some(NodeId::Agent),
            Self::Terminate => None,
        }
    }
}

/// Decide the next step from the last message of `state`.
///
/// Text alongside tool calls is provisional, so an assistant message that
/// declares calls always routes to the tools.
pub fn route(state: &ConversationState) -> RouteDecision {
    match state.last() {
        Some(last) if last.has_tool_calls() => RouteDecision::Tools,
        Some(last) if last.is_tool_result() => RouteDecision::Agent,
        _ => RouteDecision::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::types::{Message, ToolCall};

    fn state(messages: Vec<Message>) -> ConversationState {
        ConversationState::new(messages)
    }

    #[test]
    fn tool_calls_route_to_tools_even_with_text() {
        let call = ToolCall::new("c1", "lookup", json!({"x": 1}));
        let s = state(vec![
            Message::user("q"),
            Message::assistant_with_calls("let me check", vec![call]),
        ]);
        assert_eq!(route(&s), RouteDecision::Tools);
    }

    #[test]
    fn tool_result_routes_back_to_agent() {
        let s = state(vec![Message::tool_result("c1", "42")]);
        assert_eq!(route(&s), RouteDecision::Agent);
    }

    #[test]
    fn plain_messages_terminate() {
        assert_eq!(route(&state(vec![Message::assistant("hi")])), RouteDecision::Terminate);
        assert_eq!(route(&state(vec![Message::user("hello")])), RouteDecision::Terminate);
        assert_eq!(route(&ConversationState::default()), RouteDecision::Terminate);
    }

    #[test]
    fn next_node_matches_decision() {
        assert_eq!(RouteDecision::Tools.next_node(), Some(NodeId::Tools));
        assert_eq!(RouteDecision::Agent.next_node(), Some(NodeId::Agent));
        assert_eq!(RouteDecision::Terminate.next_node(), None);
    }
}
