//! Append-only conversation history and its summary statistics.

use serde::{Deserialize, Serialize};

use super::message::{Message, Mode, Sender};

/// Ordered, append-only sequence of messages.
///
/// Entries are never edited in place; the only way to remove them is
/// [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent `n` messages, oldest first.
    pub fn last_n(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Seconds between the first and last entries (0 with fewer than two).
    pub fn duration_secs(&self) -> i64 {
        match (self.messages.first(), self.messages.last()) {
            (Some(first), Some(last)) if self.messages.len() >= 2 => {
                let millis = (last.timestamp - first.timestamp).num_milliseconds();
                (millis as f64 / 1000.0).round() as i64
            }
            _ => 0,
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        let turns: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.sender != Sender::System)
            .collect();

        let mut modes_used: Vec<Mode> = Vec::new();
        for m in &turns {
            if !modes_used.contains(&m.mode) {
                modes_used.push(m.mode);
            }
        }

        ConversationSummary {
            total_messages: turns.len(),
            user_messages: turns.iter().filter(|m| m.sender == Sender::User).count(),
            ai_messages: turns.iter().filter(|m| m.sender == Sender::Ai).count(),
            modes_used,
            duration: self.duration_secs(),
            word_count: turns.iter().map(|m| m.text.split_whitespace().count()).sum(),
        }
    }
}

impl From<Vec<Message>> for ConversationHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Statistics over the non-system messages of a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub total_messages: usize,
    pub user_messages: usize,
    pub ai_messages: usize,
    /// Distinct modes in first-seen order.
    pub modes_used: Vec<Mode>,
    /// Seconds between first and last history entries.
    pub duration: i64,
    pub word_count: usize,
}
