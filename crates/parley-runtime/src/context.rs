//! Provider context assembly.
//!
//! Each role sees a different projection of the session history:
//!
//! - **Partner** sees a clean two-party conversation: main-thread user and
//!   partner messages only. Coach commentary and asides never leak in, so
//!   the roleplay cannot be contaminated by meta-discussion.
//! - **Coach** sees the full main thread, with partner turns and its own
//!   prior advice labeled by bracketed prefixes so the model can tell the
//!   speakers apart inside a flat user/assistant transcript.
//! - **Aside** reuses the coach projection and appends the question under
//!   an explicit marker, with framing instructions added to the coach's
//!   system prompt.
//!
//! Aside-thread messages are excluded from every projection.

use parley_core::message::{MessageRole, StoredMessage};
use parley_llm::provider::ChatMessage;

/// Label prepended to partner turns in the coach's transcript.
const PARTNER_LABEL: &str = "[Partner]";

/// Label prepended to the coach's own prior turns in its transcript.
const PRIOR_ADVICE_LABEL: &str = "[Your previous advice]";

/// Marker prepended to the question in an aside call.
const ASIDE_QUESTION_MARKER: &str = "[ASIDE QUESTION]";

/// Framing appended to the coach system prompt for aside calls.
const ASIDE_FRAMING: &str = "\n\nThe user has paused the roleplay to ask you a direct \
question, marked [ASIDE QUESTION]. Answer it directly and concisely, drawing on the \
conversation so far. Do not continue the roleplay and do not address the partner.";

/// Context for a partner call: the main thread as a two-party exchange.
#[must_use]
pub fn partner_context(history: &[StoredMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter(|m| m.is_main())
        .filter_map(|m| match m.role {
            MessageRole::User => Some(ChatMessage::user(m.content.clone())),
            MessageRole::Partner => Some(ChatMessage::assistant(m.content.clone())),
            MessageRole::Coach => None,
        })
        .collect()
}

/// Context for a coach call: the labeled full main thread.
#[must_use]
pub fn coach_context(history: &[StoredMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter(|m| m.is_main())
        .map(|m| match m.role {
            MessageRole::User => ChatMessage::user(m.content.clone()),
            MessageRole::Partner => {
                ChatMessage::assistant(format!("{PARTNER_LABEL} {}", m.content))
            }
            MessageRole::Coach => {
                ChatMessage::assistant(format!("{PRIOR_ADVICE_LABEL} {}", m.content))
            }
        })
        .collect()
}

/// Context for an aside call: the coach projection plus the marked question.
#[must_use]
pub fn aside_context(history: &[StoredMessage], question: &str) -> Vec<ChatMessage> {
    let mut messages = coach_context(history);
    messages.push(ChatMessage::user(format!("{ASIDE_QUESTION_MARKER} {question}")));
    messages
}

/// Coach system prompt with the aside framing appended.
#[must_use]
pub fn aside_system_prompt(coach_prompt: &str) -> String {
    format!("{coach_prompt}{ASIDE_FRAMING}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
