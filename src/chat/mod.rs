//! Chat module - message log reconciliation
//!
//! Pure state shared by the history-load and live-event paths of a gateway
//! session:
//!
//! - **message**: `ChatMessage`, `Role`, and the insertion-ordered `MessageLog`
//! - **reconcile**: history replace and live replace-or-append folding
//! - **emotion**: inline `[[...]]` tag extraction and display stripping

mod emotion;
mod message;
mod reconcile;

pub use emotion::{extract_emotion, strip_tags, DEFAULT_EMOTION};
pub use message::{ChatMessage, MessageLog, Role, Upsert};
pub use reconcile::{
    flatten_text, fold_event, history_messages, load_history, Fold, PLACEHOLDER_MESSAGE_ID,
};

use crate::config::IdlessEventPolicy;
use crate::gateway::protocol::GatewayMessage;

/// Message log plus the emotion derived from it
#[derive(Debug, Clone)]
pub struct Conversation {
    log: MessageLog,
    emotion: String,
    idless_events: IdlessEventPolicy,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(idless_events: IdlessEventPolicy) -> Self {
        Conversation {
            log: MessageLog::new(),
            emotion: DEFAULT_EMOTION.to_string(),
            idless_events,
        }
    }

    /// Replace the log with a history batch
    pub fn load_history(&mut self, batch: &[GatewayMessage]) {
        load_history(&mut self.log, batch);
    }

    /// Fold a live chat message; an emotion tag in its text becomes current
    pub fn apply_event(&mut self, message: &GatewayMessage) -> Fold {
        let fold = fold_event(&mut self.log, message, self.idless_events);
        if let Some(ref emotion) = fold.emotion {
            self.emotion = emotion.clone();
        }
        fold
    }

    /// Record a message the local user just sent
    pub fn push_user_message(&mut self, id: impl Into<String>, text: impl Into<String>) -> Upsert {
        self.log.upsert(ChatMessage::new(id, Role::User, text))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.log.as_slice()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Last emotion seen, `idle` until a tag arrives
    pub fn emotion(&self) -> &str {
        &self.emotion
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(IdlessEventPolicy::default())
    }
}
