//! Prompt cache hints.
//!
//! Marks the prompt positions a provider may cache: the most recent message
//! and the second-most-recent user message.  Together they let a provider
//! reuse the prefix shared with the previous turn.  Hints never change what
//! the model sees.

use crate::llm::types::{Message, PromptMessage, Role};

/// Annotate `messages` with cache hints.
pub fn apply_cache_hints(messages: Vec<Message>) -> Vec<PromptMessage> {
    let mut prompt: Vec<PromptMessage> = messages.into_iter().map(PromptMessage::plain).collect();

    let Some(last) = prompt.last_mut() else {
        return prompt;
    };
    last.cache_hint = true;

    if let Some(second_user) = prompt
        .iter_mut()
        .rev()
        .filter(|p| p.message.role == Role::User)
        .nth(1)
    {
        second_user.cache_hint = true;
    }

    prompt
}
