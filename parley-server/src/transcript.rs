//! In-memory conversation transcript.
//!
//! The transcript is an ordered list of role-tagged messages. Element 0 is
//! always the single SYSTEM message installed by [`Transcript::new`]; every
//! later element is a USER or CHATBOT message appended by the relay. Position
//! is the only ordering signal.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Built-in system instruction used when `PARLEY_SYSTEM_PROMPT` is not set.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly onboarding assistant. \
Start by getting to know the person you are talking to: ask for their name, what they do, \
and what they are looking to create or grow. Keep answers concise and format them as markdown.";

/// Author of a transcript message.
///
/// Serialized in upper case because that is the spelling the completion API
/// expects in `chat_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    System,
    User,
    Chatbot,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub message: String,
}

impl Message {
    pub fn new(role: Role, message: impl Into<String>) -> Self {
        Self { role, message: message.into() }
    }
}

/// Ordered, append-only conversation history.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create a transcript holding only the SYSTEM message.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::new(Role::System, system_prompt)] }
    }

    /// Append a message to the end of the transcript.
    ///
    /// SYSTEM messages are refused so that index 0 stays the only one;
    /// returns `false` in that case.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> bool {
        if role == Role::System {
            warn!("refusing to append a second system message to the transcript");
            return false;
        }
        self.messages.push(Message::new(role, content));
        true
    }

    /// Owned copy of the full transcript, in order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Copy of the transcript bounded to the most recent `max_turns` exchanges.
    ///
    /// At most `2 * max_turns` messages follow the SYSTEM message, and the
    /// window never opens on a CHATBOT reply whose USER message was cut off.
    /// `None` returns the full transcript.
    pub fn windowed_snapshot(&self, max_turns: Option<usize>) -> Vec<Message> {
        let Some(turns) = max_turns else {
            return self.snapshot();
        };
        let history = &self.messages[1..];
        let keep = turns.saturating_mul(2).min(history.len());
        let mut tail = &history[history.len() - keep..];
        if tail.len() < history.len() && tail.first().is_some_and(|m| m.role == Role::Chatbot) {
            tail = &tail[1..];
        }
        let mut out = Vec::with_capacity(tail.len() + 1);
        out.push(self.messages[0].clone());
        out.extend_from_slice(tail);
        out
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Drop every message past `len`. The SYSTEM message is never removed.
    pub fn rollback_to(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
