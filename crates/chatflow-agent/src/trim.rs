//! History trimming -- bound the conversation before every model call.
//!
//! [`trim_messages`] keeps the most recent part of a conversation that fits
//! in a size budget:
//!
//! 1. If the history already fits, it is returned unchanged.
//! 2. The leading system prompt (if any) is always retained.
//! 3. Whole messages are dropped from the oldest non-system message forward
//!    until the rest fits.
//! 4. The window is re-anchored so it starts on a user message.  When no
//!    user message survives step 3, the window is the most recent user
//!    message alone, so the model always sees the question it is answering.
//! 5. Tool results whose call is not declared inside the window are
//!    discarded.
//!
//! The result never exceeds the budget, except when the system prompt plus
//! the anchoring user message alone do; then it is exactly those two.
//! Trimming is a pure function of its inputs, and trimming a trimmed history
//! with the same budget returns it unchanged.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::llm::types::{Message, Role};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the size of a message is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCounter {
    /// Roughly four characters per token plus a small per-message overhead.
    #[default]
    ApproxTokens,
    /// Unicode scalar values of content and tool-call payloads.
    Chars,
    /// Every message counts as one unit.
    Messages,
}

/// Per-message overhead used by [`SizeCounter::ApproxTokens`].
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Configuration for history trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Budget, in units of [`TrimConfig::counter`].
    pub max_units: usize,
    /// How messages are measured.
    pub counter: SizeCounter,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            max_units: 8_000,
            counter: SizeCounter::ApproxTokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Size of a single message under `counter`.
pub fn message_size(message: &Message, counter: SizeCounter) -> usize {
    let chars = || {
        message.content.chars().count()
            + message
                .tool_calls
                .iter()
                .map(|tc| tc.name.chars().count() + tc.arguments.to_string().chars().count())
                .sum::<usize>()
    };

    match counter {
        SizeCounter::Messages => 1,
        SizeCounter::Chars => chars(),
        SizeCounter::ApproxTokens => chars().div_ceil(4) + MESSAGE_OVERHEAD_TOKENS,
    }
}

/// Combined size of `messages` under `counter`.
pub fn total_size(messages: &[Message], counter: SizeCounter) -> usize {
    messages.iter().map(|m| message_size(m, counter)).sum()
}

/// Trim `messages` to fit `config.max_units`.
///
/// See the module documentation for the policy.  The result always satisfies
/// the tool-pairing invariant checked by [`check_tool_pairing`] when the
/// input did.
pub fn trim_messages(messages: &[Message], config: &TrimConfig) -> Vec<Message> {
    let counter = config.counter;
    let budget = config.max_units;

    let original_size = total_size(messages, counter);
    if original_size <= budget {
        return messages.to_vec();
    }

    // Step 1: Separate the system prompt from conversation messages.
    let (system_prompt, conversation) = match messages.first() {
        Some(first) if first.role == Role::System => (Some(first), &messages[1..]),
        _ => (None, messages),
    };
    let system_size = system_prompt.map_or(0, |m| message_size(m, counter));

    // Step 2: Drop whole messages from the front until the rest fits.
    let mut start = 0;
    let mut remaining = total_size(conversation, counter);
    while start < conversation.len() && system_size + remaining > budget {
        remaining -= message_size(&conversation[start], counter);
        start += 1;
    }

    // Step 3: Re-anchor on a user message.  Without one in budget, keep only
    // the latest user message.
    let kept = match conversation[start..].iter().position(|m| m.role == Role::User) {
        Some(offset) => &conversation[start + offset..],
        None => match conversation.iter().rposition(|m| m.role == Role::User) {
            Some(anchor) => &conversation[anchor..=anchor],
            None => &[],
        },
    };

    // Step 4: Build the window.
    let mut window = Vec::with_capacity(1 + kept.len());
    if let Some(sys) = system_prompt {
        window.push(sys.clone());
    }
    window.extend(discard_broken_tool_results(kept));

    debug!(
        original = messages.len(),
        kept = window.len(),
        original_size,
        kept_size = total_size(&window, counter),
        budget,
        "trimmed conversation history"
    );

    window
}

/// Drop tool results that do not answer a call declared by the assistant
/// message opening their run.
///
/// A tool message is kept only if it belongs to the contiguous run of tool
/// messages directly after an assistant message that declared its
/// `tool_call_id`, and no earlier result in that run answered the same call.
pub fn discard_broken_tool_results(messages: &[Message]) -> Vec<Message> {
    let mut kept = Vec::with_capacity(messages.len());
    let mut open_calls: HashSet<&str> = HashSet::new();

    for message in messages {
        match message.role {
            Role::Tool => {
                let answered = message
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| open_calls.remove(id));
                if answered {
                    kept.push(message.clone());
                } else {
                    warn!(
                        tool_call_id = message.tool_call_id.as_deref().unwrap_or("<none>"),
                        "discarding orphaned tool result"
                    );
                }
            }
            Role::Assistant => {
                open_calls = message.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
                kept.push(message.clone());
            }
            Role::User | Role::System => {
                open_calls.clear();
                kept.push(message.clone());
            }
        }
    }

    kept
}

/// Verify that every tool message answers a call declared by the assistant
/// message opening its run.
///
/// # Errors
///
/// Returns [`AgentError::TrimmingInvariant`] naming the first offending
/// message.
pub fn check_tool_pairing(messages: &[Message]) -> Result<()> {
    let mut open_calls: HashSet<&str> = HashSet::new();

    for (index, message) in messages.iter().enumerate() {
        match message.role {
            Role::Tool => {
                let Some(id) = message.tool_call_id.as_deref() else {
                    return Err(AgentError::TrimmingInvariant {
                        index,
                        reason: "tool message without tool_call_id".into(),
                    });
                };
                if !open_calls.remove(id) {
                    return Err(AgentError::TrimmingInvariant {
                        index,
                        reason: format!("tool result `{id}` has no matching pending call"),
                    });
                }
            }
            Role::Assistant => {
                open_calls = message.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
            }
            Role::User | Role::System => open_calls.clear(),
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolCall;

    fn by_messages(max_units: usize) -> TrimConfig {
        TrimConfig {
            max_units,
            counter: SizeCounter::Messages,
        }
    }

    fn make_messages(count: usize) -> Vec<Message> {
        let mut msgs = vec![Message::system("You are a helpful assistant.")];
        for i in 0..count {
            if i % 2 == 0 {
                msgs.push(Message::user(format!("User message {i}")));
            } else {
                msgs.push(Message::assistant(format!("Assistant response {i}")));
            }
        }
        msgs
    }

    fn tool_exchange(id: &str, output: &str) -> Vec<Message> {
        vec![
            Message::assistant_with_calls(
                "",
                vec![ToolCall::new(id, "lookup", serde_json::json!({"x": 1}))],
            ),
            Message::tool_result(id, output),
        ]
    }

    #[test]
    fn within_budget_is_unchanged() {
        let messages = make_messages(6);
        assert_eq!(trim_messages(&messages, &by_messages(7)), messages);
    }

    #[test]
    fn keeps_system_prompt_and_starts_on_user() {
        let messages = make_messages(10);
        let trimmed = trim_messages(&messages, &by_messages(4));

        assert_eq!(trimmed[0].role, Role::System);
        assert_eq!(trimmed[1].role, Role::User);
        assert!(trimmed.len() <= 4);
        assert_eq!(trimmed.last(), messages.last());
    }

    #[test]
    fn never_starts_mid_tool_exchange() {
        let mut messages = vec![Message::user("first"), Message::assistant("ok")];
        messages.push(Message::user("look it up"));
        messages.extend(tool_exchange("c1", "42"));
        messages.push(Message::assistant("it is 42"));
        messages.push(Message::user("thanks"));
        messages.push(Message::assistant("welcome"));

        // A window of 4 would start at the tool result; the anchor moves to
        // the next user message instead.
        let trimmed = trim_messages(&messages, &by_messages(4));
        assert_eq!(trimmed, messages[6..].to_vec());
        assert!(check_tool_pairing(&trimmed).is_ok());
    }

    #[test]
    fn falls_back_to_latest_user_message_alone() {
        let mut messages = vec![Message::user("what is x?")];
        messages.extend(tool_exchange("c1", &"y".repeat(200)));

        let config = TrimConfig {
            max_units: 50,
            counter: SizeCounter::Chars,
        };
        let trimmed = trim_messages(&messages, &config);
        assert_eq!(trimmed, vec![Message::user("what is x?")]);
        assert!(total_size(&trimmed, config.counter) <= 50);
    }

    #[test]
    fn size_stays_within_budget_or_system_plus_anchor() {
        let mut long_tail = make_messages(7);
        long_tail.push(Message::user("and now?"));
        long_tail.extend(tool_exchange("c1", &"y".repeat(200)));

        let mut no_system = vec![Message::user("what is x?")];
        no_system.extend(tool_exchange("c2", &"w".repeat(120)));
        no_system.push(Message::assistant("x is long"));

        let mut mixed = make_messages(9);
        mixed.extend(tool_exchange("c3", "short"));
        mixed.push(Message::user("q".repeat(90)));

        for messages in [long_tail, no_system, mixed] {
            for counter in [SizeCounter::Chars, SizeCounter::ApproxTokens, SizeCounter::Messages] {
                let total = total_size(&messages, counter);
                for max_units in 0..=total + 1 {
                    let config = TrimConfig { max_units, counter };
                    let trimmed = trim_messages(&messages, &config);

                    let (system, rest) = match trimmed.first() {
                        Some(first) if first.role == Role::System => (Some(first), &trimmed[1..]),
                        _ => (None, &trimmed[..]),
                    };
                    if let Some(first) = rest.first() {
                        assert_eq!(first.role, Role::User, "window must open on a user message");
                    }
                    let floor = system.map_or(0, |m| message_size(m, counter))
                        + rest.first().map_or(0, |m| message_size(m, counter));

                    let size = total_size(&trimmed, counter);
                    assert!(
                        size <= max_units.max(floor),
                        "size {size} over budget {max_units} ({counter:?}, floor {floor})"
                    );
                    if size > max_units {
                        assert!(rest.len() <= 1, "over budget only with the anchor alone");
                    }
                    assert!(check_tool_pairing(&trimmed).is_ok());
                }
            }
        }
    }

    #[test]
    fn trimming_is_idempotent() {
        let mut messages = make_messages(9);
        messages.extend(tool_exchange("c1", "result"));
        messages.push(Message::user("next"));
        messages.extend(tool_exchange("c2", &"z".repeat(80)));

        for max_units in [1, 20, 60, 120, 400] {
            let config = TrimConfig {
                max_units,
                counter: SizeCounter::Chars,
            };
            let once = trim_messages(&messages, &config);
            let twice = trim_messages(&once, &config);
            assert_eq!(once, twice, "not idempotent at budget {max_units}");
            assert!(check_tool_pairing(&once).is_ok());
        }
    }

    #[test]
    fn respects_budget_when_an_anchor_fits() {
        let messages = make_messages(20);
        let config = TrimConfig {
            max_units: 80,
            counter: SizeCounter::ApproxTokens,
        };
        let trimmed = trim_messages(&messages, &config);
        assert!(total_size(&trimmed, config.counter) <= 80);
        assert_eq!(trimmed[0].role, Role::System);
    }

    #[test]
    fn discards_orphaned_tool_results() {
        let messages = vec![
            Message::tool_result("gone", "stale"),
            Message::user("hi"),
            Message::tool_result("c9", "nobody asked"),
        ];
        let cleaned = discard_broken_tool_results(&messages);
        assert_eq!(cleaned, vec![Message::user("hi")]);
    }

    #[test]
    fn pairing_check_reports_first_violation() {
        let mut messages = vec![Message::user("q")];
        messages.extend(tool_exchange("c1", "ok"));
        assert!(check_tool_pairing(&messages).is_ok());

        messages.push(Message::tool_result("c1", "duplicate"));
        match check_tool_pairing(&messages) {
            Err(AgentError::TrimmingInvariant { index, .. }) => assert_eq!(index, 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn message_size_counts_tool_calls() {
        let call = Message::assistant_with_calls(
            "ab",
            vec![ToolCall::new("c1", "abc", serde_json::json!({}))],
        );
        assert_eq!(message_size(&call, SizeCounter::Chars), 2 + 3 + 2);
        assert_eq!(message_size(&call, SizeCounter::Messages), 1);
        assert_eq!(
            message_size(&Message::user("12345678"), SizeCounter::ApproxTokens),
            2 + MESSAGE_OVERHEAD_TOKENS
        );
    }
}
