//! Folding gateway payloads into the message log
//!
//! History responses replace the whole log; live `chat` events replace the
//! message with the same id in place (streaming updates) or append.

use tracing::debug;
use uuid::Uuid;

use super::emotion::extract_emotion;
use super::message::{ChatMessage, MessageLog, Upsert};
use crate::config::IdlessEventPolicy;
use crate::gateway::protocol::{GatewayMessage, MessageContent};

/// Id given to live messages that arrive without one (coalescing policy)
pub const PLACEHOLDER_MESSAGE_ID: &str = "live-msg";

/// Concatenate the text parts of a message; non-text parts contribute nothing
pub fn flatten_text(content: Option<&MessageContent>) -> String {
    match content {
        None => String::new(),
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => {
            parts.iter().filter_map(|p| p.text.as_deref()).collect()
        }
    }
}

/// Map a history batch to log entries, in the order received.
/// Messages without an id get a fresh one.
pub fn history_messages(batch: &[GatewayMessage]) -> Vec<ChatMessage> {
    batch
        .iter()
        .map(|m| {
            let id = m
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            ChatMessage::new(id, m.role, flatten_text(m.content.as_ref()))
        })
        .collect()
}

/// Replace the entire log with a history batch
pub fn load_history(log: &mut MessageLog, batch: &[GatewayMessage]) {
    log.replace_all(history_messages(batch));
    debug!("Loaded {} history messages", log.len());
}

/// Result of folding one live event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Where the message landed
    pub upsert: Upsert,
    /// Id the message was stored under
    pub id: String,
    /// Emotion named in the folded text, if any
    pub emotion: Option<String>,
}

/// Fold a live `chat` event message into the log
pub fn fold_event(log: &mut MessageLog, message: &GatewayMessage, policy: IdlessEventPolicy) -> Fold {
    let id = match (&message.id, policy) {
        (Some(id), _) => id.clone(),
        (None, IdlessEventPolicy::Coalesce) => PLACEHOLDER_MESSAGE_ID.to_string(),
        (None, IdlessEventPolicy::Fresh) => Uuid::new_v4().to_string(),
    };

    let text = flatten_text(message.content.as_ref());
    let emotion = extract_emotion(&text).map(str::to_string);
    let upsert = log.upsert(ChatMessage::new(id.clone(), message.role, text));

    Fold { upsert, id, emotion }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use crate::gateway::protocol::ContentPart;

    fn msg(id: Option<&str>, role: Role, parts: &[&str]) -> GatewayMessage {
        GatewayMessage {
            id: id.map(str::to_string),
            role,
            content: Some(MessageContent::Parts(
                parts.iter().map(|t| ContentPart::text(*t)).collect(),
            )),
        }
    }

    #[test]
    fn test_flatten_ignores_non_text_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("Hel"),
            ContentPart {
                kind: Some("image".to_string()),
                text: None,
            },
            ContentPart::text("lo"),
        ]);
        assert_eq!(flatten_text(Some(&content)), "Hello");
        assert_eq!(flatten_text(Some(&MessageContent::Text("plain".into()))), "plain");
        assert_eq!(flatten_text(None), "");
    }

    #[test]
    fn test_history_replaces_log() {
        let mut log = MessageLog::new();
        load_history(&mut log, &[msg(Some("a"), Role::User, &["1"]), msg(Some("b"), Role::Model, &["2"]), msg(Some("c"), Role::Model, &["3"])]);
        assert_eq!(log.len(), 3);

        let five: Vec<_> = (0..5)
            .map(|i| msg(Some(&format!("m{}", i)), Role::Model, &["x"]))
            .collect();
        load_history(&mut log, &five);
        assert_eq!(log.len(), 5);
        assert_eq!(log.as_slice()[0].id, "m0");
    }

    #[test]
    fn test_history_assigns_missing_ids() {
        let batch = [msg(None, Role::Model, &["a"]), msg(None, Role::Model, &["b"])];
        let messages = history_messages(&batch);
        assert_ne!(messages[0].id, messages[1].id);
    }

    #[test]
    fn test_same_id_replaces_and_later_text_wins() {
        let mut log = MessageLog::new();
        fold_event(&mut log, &msg(Some("m1"), Role::Model, &["Hi"]), IdlessEventPolicy::Coalesce);
        let fold = fold_event(&mut log, &msg(Some("m1"), Role::Model, &["Hi ", "there"]), IdlessEventPolicy::Coalesce);

        assert_eq!(fold.upsert, Upsert::Replaced(0));
        assert_eq!(log.len(), 1);
        assert_eq!(log.as_slice()[0].content, "Hi there");
    }

    #[test]
    fn test_new_id_appends_preserving_order() {
        let mut log = MessageLog::new();
        load_history(&mut log, &[msg(Some("a"), Role::User, &["q"]), msg(Some("b"), Role::Model, &["r"])]);

        let fold = fold_event(&mut log, &msg(Some("c"), Role::Model, &["s"]), IdlessEventPolicy::Coalesce);
        assert_eq!(fold.upsert, Upsert::Appended(2));
        let ids: Vec<_> = log.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_idless_events_coalesce_by_default() {
        let mut log = MessageLog::new();
        fold_event(&mut log, &msg(None, Role::Model, &["one"]), IdlessEventPolicy::Coalesce);
        let fold = fold_event(&mut log, &msg(None, Role::Model, &["two"]), IdlessEventPolicy::Coalesce);

        assert_eq!(fold.id, PLACEHOLDER_MESSAGE_ID);
        assert_eq!(log.len(), 1);
        assert_eq!(log.as_slice()[0].content, "two");
    }

    #[test]
    fn test_idless_events_fresh_policy() {
        let mut log = MessageLog::new();
        fold_event(&mut log, &msg(None, Role::Model, &["one"]), IdlessEventPolicy::Fresh);
        fold_event(&mut log, &msg(None, Role::Model, &["two"]), IdlessEventPolicy::Fresh);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_fold_reports_emotion_from_raw_text() {
        let mut log = MessageLog::new();
        let fold = fold_event(
            &mut log,
            &msg(Some("m"), Role::User, &["Hello [[emotion:name=joy|intensity=0.8]] world"]),
            IdlessEventPolicy::Coalesce,
        );
        assert_eq!(fold.emotion.as_deref(), Some("joy"));
        assert_eq!(log.as_slice()[0].content, "Hello [[emotion:name=joy|intensity=0.8]] world");
    }
}
