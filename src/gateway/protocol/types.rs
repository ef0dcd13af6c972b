//! Gateway protocol types
//!
//! Request params, response results and event payloads for the methods and
//! events this client uses.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::chat::Role;

/// Method names
pub mod methods {
    /// Handshake carrying protocol range, client identity and auth
    pub const CONNECT: &str = "connect";
    /// Recent messages of a session
    pub const CHAT_HISTORY: &str = "chat.history";
    /// Submit user text
    pub const CHAT_SEND: &str = "chat.send";
}

/// Event names
pub mod events {
    /// Chat message created or updated
    pub const CHAT: &str = "chat";
}

// ============================================================================
// Connect
// ============================================================================

/// `connect` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol version accepted
    pub min_protocol: u32,
    /// Highest protocol version accepted
    pub max_protocol: u32,
    /// Client identity
    pub client: ClientInfo,
    /// Credentials
    pub auth: AuthParams,
}

/// Client identity advertised on connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client id
    pub id: String,
    /// Client mode
    pub mode: String,
}

/// Connect credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthParams {
    /// Gateway bearer token
    pub token: String,
}

impl std::fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthParams").field("token", &"[REDACTED]").finish()
    }
}

// ============================================================================
// Chat
// ============================================================================

/// `chat.history` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryParams {
    /// Session to read
    pub session_key: String,
    /// Maximum number of messages
    pub limit: u32,
}

/// `chat.history` result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistoryResult {
    /// Messages, oldest first. Entries that do not decode are skipped.
    #[serde(default, deserialize_with = "skip_malformed_messages")]
    pub messages: Vec<GatewayMessage>,
}

fn skip_malformed_messages<'de, D>(deserializer: D) -> Result<Vec<GatewayMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping history message {}: {}", index, e);
                None
            }
        })
        .collect())
}

/// `chat.send` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    /// Target session
    pub session_key: String,
    /// User text
    pub message: String,
    /// Whether the gateway should also deliver the reply to external channels
    pub deliver: bool,
}

/// Payload of a `chat` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEventPayload {
    /// Generation state (`delta`, `final`, ...)
    #[serde(default)]
    pub state: Option<String>,
    /// Session the message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// The message, complete so far
    pub message: GatewayMessage,
}

/// A message as the gateway sends it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Message id (may be absent on live events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Author
    pub role: Role,
    /// Body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

/// Message body: a list of parts, or bare text on lenient gateways
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Typed parts
    Parts(Vec<ContentPart>),
    /// Bare text
    Text(String),
}

/// One part of a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Part type (`text`, `image`, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Text, for text parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentPart {
    /// A text part
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart {
            kind: Some("text".to_string()),
            text: Some(text.into()),
        }
    }
}
