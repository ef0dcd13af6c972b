//! Gateway Protocol - JSON text frames over a WebSocket
//!
//! ## Protocol Overview
//!
//! - **JSON-based messages** over WebSocket
//! - **Request-response pattern** correlated by client-generated ids
//! - **Event streaming** routed by event name
//!
//! ## Message Types
//!
//! - `req`: Client-initiated requests
//! - `res`: Gateway responses to requests
//! - `event`: Gateway-pushed events (chat updates)

pub mod schema;
pub mod types;

pub use schema::{
    decode, encode, Envelope, EventFrame, ParseError, ProtocolError, RequestFrame, ResponseFrame,
    PROTOCOL_VERSION,
};
pub use types::*;
