//! Storage configuration types
//!
//! Configuration for the agent directory backends and the device vault.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Agent directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory backend
    #[serde(default)]
    pub backend: DirectoryBackendType,
    /// JSON file location (file backend)
    pub path: Option<PathBuf>,
    /// PostgreSQL configuration (postgres backend)
    pub postgres: Option<PostgresConfig>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig {
            backend: DirectoryBackendType::File,
            path: None,
            postgres: None,
        }
    }
}

impl DirectoryConfig {
    /// Resolved location of the JSON directory file
    pub fn file_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::config::paths::agents_path)
    }
}

/// Directory backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackendType {
    /// Local JSON file (default)
    #[default]
    File,
    /// PostgreSQL `agents` table
    Postgres,
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database URL
    #[serde(default = "empty_secret", skip_serializing)]
    pub url: SecretString,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    /// Create a config for the given URL with default pool settings
    pub fn with_url(url: impl Into<String>) -> Self {
        PostgresConfig {
            url: SecretString::from(url.into()),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

/// Device vault configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Override for the key slot location
    pub key_path: Option<PathBuf>,
}

impl VaultConfig {
    /// Resolved location of the key slot
    pub fn key_path(&self) -> PathBuf {
        self.key_path
            .clone()
            .unwrap_or_else(crate::config::paths::vault_key_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_directory_config_default() {
        let config = DirectoryConfig::default();
        assert_eq!(config.backend, DirectoryBackendType::File);
        assert!(config.file_path().ends_with("agents.json"));
    }

    #[test]
    fn test_postgres_url_is_not_serialized() {
        let config = PostgresConfig::with_url("postgres://user:pw@localhost/anima");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("pw@localhost"));

        let back: PostgresConfig = serde_json::from_str(&json).unwrap();
        assert!(back.url.expose_secret().is_empty());
        assert_eq!(back.max_connections, 5);
    }
}
