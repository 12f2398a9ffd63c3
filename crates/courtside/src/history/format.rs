//! Context formatting for provider requests
//!
//! Chat-style providers take a list of role-tagged messages; prompt-style
//! providers take one flattened transcript. Both functions are pure.

use crate::history::types::{ChatMessage, Exchange};

/// Marker line introducing prior turns in a transcript
pub const HISTORY_MARKER: &str = "History:";

/// Final line of a transcript, telling the model where to continue
pub const ANSWER_CUE: &str = "Answer:";

/// Turn stored exchanges (oldest first) into alternating user/assistant messages
///
/// Empty questions or answers are left out.
pub fn to_message_list(exchanges: &[Exchange]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(exchanges.len() * 2);

    for exchange in exchanges {
        if !exchange.question.is_empty() {
            messages.push(ChatMessage::user(exchange.question.as_str()));
        }
        if !exchange.answer.is_empty() {
            messages.push(ChatMessage::assistant(exchange.answer.as_str()));
        }
    }

    messages
}

/// Flatten a conversation into a single prompt string
///
/// Layout:
/// ```text
/// <system prompt>
///
/// History:
/// User: ...
/// Assistant: ...
///
/// User: <question>
/// Answer:
/// ```
pub fn to_transcript(system_prompt: &str, messages: &[ChatMessage], question: &str) -> String {
    let history_len: usize = messages.iter().map(|m| m.content.len() + 12).sum();
    let mut out =
        String::with_capacity(system_prompt.len() + history_len + question.len() + 32);

    out.push_str(system_prompt);
    out.push_str("\n\n");
    out.push_str(HISTORY_MARKER);
    out.push('\n');

    for message in messages.iter().filter(|m| !m.content.is_empty()) {
        out.push_str(message.role.label());
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }

    out.push('\n');
    out.push_str("User: ");
    out.push_str(question);
    out.push('\n');
    out.push_str(ANSWER_CUE);
    out
}
