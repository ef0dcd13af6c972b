//! # Anima
//!
//! Console client for remotely hosted autonomous agents.
//!
//! ## Features
//!
//! - **Gateway Session Client:** one WebSocket per agent, request/response
//!   correlation and live chat events reconciled into an ordered message log
//! - **Zero-Knowledge Token Vault:** the gateway token is AES-256-GCM
//!   encrypted with a device-local key before it reaches the agent directory
//! - **Connection Probe:** handshake check before an agent is saved
//! - **Agent Directory:** JSON file or PostgreSQL storage of agent records
//!
//! ## Layout
//!
//! - [`vault`]: device key and token encryption
//! - [`gateway`]: protocol codec, session actor, probe
//! - [`chat`]: message log reconciliation and emotion tags
//! - [`directory`]: agent records and the signed-in identity
//! - [`setup`] / [`console`]: the two user flows built on the above

pub mod chat;
pub mod config;
pub mod console;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod setup;
pub mod vault;

pub use config::Config;
pub use console::{open_console, ConsoleLaunch};
pub use error::{Error, Result};
pub use gateway::{ConnectionState, SessionClient, SessionSnapshot};
pub use setup::{AgentSetup, SetupFailure, SetupForm, SetupStage};
pub use vault::TokenVault;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
