//! Configuration types module

pub mod storage;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Live gateway session settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Connection probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Device vault settings
    #[serde(default)]
    pub vault: storage::VaultConfig,

    /// Agent directory settings
    #[serde(default)]
    pub directory: storage::DirectoryConfig,

    /// Local identity
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// Layers, lowest precedence first:
    /// 1. Default values
    /// 2. Config file (if present)
    /// 3. Environment variable overrides
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Live gateway session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Client id sent as the `clientId` query parameter and in `connect`
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Client mode advertised in `connect`
    #[serde(default = "default_client_id")]
    pub client_mode: String,
    /// Lowest protocol version we speak
    #[serde(default = "default_protocol")]
    pub min_protocol: u32,
    /// Highest protocol version we speak
    #[serde(default = "default_protocol")]
    pub max_protocol: u32,
    /// Session key used for history and sends
    #[serde(default = "default_session_key")]
    pub session_key: String,
    /// Number of history messages requested on connect
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    /// How long an unanswered request stays in the pending table
    #[serde(with = "humantime_serde", default = "default_pending_ttl")]
    pub pending_request_ttl: Duration,
    /// Handling of chat events that carry no message id
    #[serde(default)]
    pub idless_events: IdlessEventPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            client_id: default_client_id(),
            client_mode: default_client_id(),
            min_protocol: default_protocol(),
            max_protocol: default_protocol(),
            session_key: default_session_key(),
            history_limit: default_history_limit(),
            pending_request_ttl: default_pending_ttl(),
            idless_events: IdlessEventPolicy::default(),
        }
    }
}

fn default_client_id() -> String {
    "webchat".to_string()
}

fn default_protocol() -> u32 {
    crate::gateway::PROTOCOL_VERSION
}

fn default_session_key() -> String {
    "default".to_string()
}

fn default_history_limit() -> u32 {
    50
}

fn default_pending_ttl() -> Duration {
    Duration::from_secs(120)
}

/// What to do with a `chat` event whose message has no id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlessEventPolicy {
    /// Fold every id-less event into one placeholder message
    #[default]
    Coalesce,
    /// Give every id-less event its own fresh message id
    Fresh,
}

/// Connection probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeConfig {
    /// Client id sent as the `clientId` query parameter
    #[serde(default = "default_probe_client_id")]
    pub client_id: String,
    /// Handshake deadline
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            client_id: default_probe_client_id(),
            timeout: default_probe_timeout(),
        }
    }
}

fn default_probe_client_id() -> String {
    "anima-dashboard".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_millis(5000)
}

/// Local identity configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Signed-in user id; `None` means nobody is signed in
    pub user_id: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info,anima=debug".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid log format: {}. Valid options: pretty, json",
                s
            ))),
        }
    }
}
