//! Conversation state passed between graph nodes.

use serde::{Deserialize, Serialize};

use crate::llm::types::{Message, Role, ToolCall};

/// The ordered message history of one thread.
///
/// Only the agent node (one assistant message per turn) and the tool node
/// (one tool result per resolved call) append to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Messages in conversational order.
    pub messages: Vec<Message>,
}

impl ConversationState {
    /// Create a state from existing messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append one message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool calls declared by the last message, if it is an assistant turn.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.last() {
            Some(m) if m.role == Role::Assistant => &m.tool_calls,
            _ => &[],
        }
    }

    /// The state with a trailing assistant turn whose tool calls were never
    /// answered removed.
    ///
    /// Used when a run stops before the tool node could resolve the calls, so
    /// the stored history never ends on an open tool exchange.
    pub fn without_unresolved_tail(mut self) -> Self {
        if !self.pending_tool_calls().is_empty() {
            self.messages.pop();
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pending_calls_come_from_last_assistant_only() {
        let call = ToolCall::new("c1", "lookup", json!({}));
        let mut state = ConversationState::new(vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call]),
        ]);
        assert_eq!(state.pending_tool_calls().len(), 1);

        state.push(Message::tool_result("c1", "42"));
        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn unresolved_tail_is_dropped() {
        let call = ToolCall::new("c1", "lookup", json!({}));
        let state = ConversationState::new(vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call]),
        ]);
        assert_eq!(
            state.without_unresolved_tail(),
            ConversationState::new(vec![Message::user("q")])
        );

        let done = ConversationState::new(vec![Message::user("q"), Message::assistant("a")]);
        assert_eq!(done.clone().without_unresolved_tail(), done);
    }
}
