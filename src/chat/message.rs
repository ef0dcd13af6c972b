//! Chat message types and the ordered message log

use serde::{Deserialize, Serialize};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human at the console
    User,
    /// The agent (`assistant` on some gateways)
    #[serde(alias = "assistant")]
    Model,
    /// System notices
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the session's message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique within the log
    pub id: String,
    /// Author
    pub role: Role,
    /// Flattened text, inline tags included
    pub content: String,
}

impl ChatMessage {
    /// Create a new message
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            id: id.into(),
            role,
            content: content.into(),
        }
    }

    /// Text for a human reader: inline `[[...]]` tags removed.
    /// The stored content is left untouched.
    pub fn display_text(&self) -> String {
        super::emotion::strip_tags(&self.content)
    }
}

/// Result of [`MessageLog::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// An existing message at this index had its content replaced
    Replaced(usize),
    /// A new message was appended at this index
    Appended(usize),
}

impl Upsert {
    pub fn index(&self) -> usize {
        match self {
            Upsert::Replaced(i) | Upsert::Appended(i) => *i,
        }
    }
}

/// Insertion-ordered message log with id-based replace-or-append
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log, keeping the given order
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    /// Replace the content of the message with the same id in place, or
    /// append it when the id is new. Role of an existing entry is kept.
    pub fn upsert(&mut self, message: ChatMessage) -> Upsert {
        match self.position(&message.id) {
            Some(index) => {
                self.messages[index].content = message.content;
                Upsert::Replaced(index)
            }
            None => {
                self.messages.push(message);
                Upsert::Appended(self.messages.len() - 1)
            }
        }
    }

    /// Index of the message with this id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }
}
