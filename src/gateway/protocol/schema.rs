//! Gateway protocol schema
//!
//! Defines the wire format for gateway messages and the text codec.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};

/// Protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = 3;

/// Top-level message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Client-initiated request
    #[serde(rename = "req")]
    Request(RequestFrame),
    /// Gateway response to a request
    #[serde(rename = "res")]
    Response(ResponseFrame),
    /// Gateway-pushed event
    #[serde(rename = "event")]
    Event(EventFrame),
}

/// Request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default)]
    pub params: Value,
    /// Unique request ID
    pub id: String,
}

/// Response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Method of the originating request (not all gateways echo it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request ID this responds to
    pub id: String,
    /// Explicit success flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Result (success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

/// Event frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name
    pub event: String,
    /// Event payload, shape depends on the name
    #[serde(default)]
    pub payload: Value,
    /// Gateway sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Protocol error. Gateways send either `{code, message}` or a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireProtocolError")]
pub struct ProtocolError {
    /// Error code (numeric or symbolic depending on the gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireProtocolError {
    Message(String),
    Detailed {
        #[serde(default)]
        code: Option<Value>,
        #[serde(default)]
        message: String,
    },
}

impl From<WireProtocolError> for ProtocolError {
    fn from(wire: WireProtocolError) -> Self {
        match wire {
            WireProtocolError::Message(message) => ProtocolError { code: None, message },
            WireProtocolError::Detailed { code, message } => ProtocolError { code, message },
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(ref code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Why an inbound frame was rejected
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not JSON at all
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    /// JSON without a string `type`
    #[error("frame has no type tag")]
    MissingType,

    /// `type` is not req/res/event
    #[error("unknown frame type {0:?}")]
    UnknownType(String),

    /// Known type, wrong shape
    #[error("malformed {kind} frame: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },

    /// Known event, wrong payload shape
    #[error("malformed {event} payload: {source}")]
    Payload {
        event: String,
        source: serde_json::Error,
    },
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Encode an envelope as wire text
pub fn encode(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode wire text. Never panics; malformed input yields a [`ParseError`].
pub fn decode(text: &str) -> std::result::Result<Envelope, ParseError> {
    let value: Value = serde_json::from_str(text).map_err(ParseError::InvalidJson)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingType)?;

    match kind {
        "req" => serde_json::from_value(value)
            .map(Envelope::Request)
            .map_err(|source| ParseError::Malformed { kind: "req", source }),
        "res" => serde_json::from_value(value)
            .map(Envelope::Response)
            .map_err(|source| ParseError::Malformed { kind: "res", source }),
        "event" => serde_json::from_value(value)
            .map(Envelope::Event)
            .map_err(|source| ParseError::Malformed { kind: "event", source }),
        other => Err(ParseError::UnknownType(other.to_string())),
    }
}

impl RequestFrame {
    /// Create a request with a freshly generated id
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        RequestFrame {
            method: method.into(),
            params,
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl ResponseFrame {
    /// Create a success response
    pub fn success(id: impl Into<String>, method: Option<&str>, result: Value) -> Self {
        ResponseFrame {
            method: method.map(str::to_string),
            id: id.into(),
            ok: Some(true),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<String>, method: Option<&str>, error: ProtocolError) -> Self {
        ResponseFrame {
            method: method.map(str::to_string),
            id: id.into(),
            ok: Some(false),
            result: None,
            error: Some(error),
        }
    }

    /// Whether the gateway reported success
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.ok != Some(false)
    }
}

impl EventFrame {
    /// Create a new event
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        EventFrame {
            event: event.into(),
            payload,
            seq: None,
        }
    }

    /// Deserialize the payload into the shape this event name implies
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> std::result::Result<T, ParseError> {
        serde_json::from_value(self.payload.clone()).map_err(|source| ParseError::Payload {
            event: self.event.clone(),
            source,
        })
    }
}

impl From<RequestFrame> for Envelope {
    fn from(frame: RequestFrame) -> Self {
        Envelope::Request(frame)
    }
}

impl From<ResponseFrame> for Envelope {
    fn from(frame: ResponseFrame) -> Self {
        Envelope::Response(frame)
    }
}

impl From<EventFrame> for Envelope {
    fn from(frame: EventFrame) -> Self {
        Envelope::Event(frame)
    }
}
