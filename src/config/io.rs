//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::storage::{DirectoryBackendType, PostgresConfig};
use super::types::{Config, IdlessEventPolicy};
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` if present, then overlays any set variables.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable source
pub(crate) fn apply_overrides<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Identity
    if let Some(user) = var("ANIMA_USER_ID") {
        config.identity.user_id = Some(user).filter(|u| !u.trim().is_empty());
    }

    // Gateway overrides
    if let Some(client_id) = var("ANIMA_CLIENT_ID") {
        config.gateway.client_id = client_id;
    }
    if let Some(session_key) = var("ANIMA_SESSION_KEY") {
        config.gateway.session_key = session_key;
    }
    if let Some(limit) = var("ANIMA_HISTORY_LIMIT") {
        if let Ok(v) = limit.parse() {
            config.gateway.history_limit = v;
        }
    }
    if let Some(policy) = var("ANIMA_IDLESS_EVENTS") {
        match policy.to_lowercase().as_str() {
            "fresh" => config.gateway.idless_events = IdlessEventPolicy::Fresh,
            "coalesce" => config.gateway.idless_events = IdlessEventPolicy::Coalesce,
            _ => {}
        }
    }

    // Probe overrides
    if let Some(timeout) = var("ANIMA_PROBE_TIMEOUT") {
        if let Ok(v) = humantime_serde::re::humantime::parse_duration(&timeout) {
            config.probe.timeout = v;
        }
    }

    // Vault overrides
    if let Some(path) = var("ANIMA_VAULT_KEY_PATH") {
        config.vault.key_path = Some(std::path::PathBuf::from(path));
    }

    // Directory overrides
    if let Some(path) = var("ANIMA_AGENTS_FILE") {
        config.directory.path = Some(std::path::PathBuf::from(path));
    }
    if let Some(database_url) = var("DATABASE_URL") {
        let pg = config
            .directory
            .postgres
            .get_or_insert_with(|| PostgresConfig::with_url(String::new()));
        pg.url = secrecy::SecretString::from(database_url);
        config.directory.backend = DirectoryBackendType::Postgres;
    }
    if let Some(max_conn) = var("DATABASE_MAX_CONNECTIONS") {
        if let Some(ref mut pg) = config.directory.postgres {
            if let Ok(v) = max_conn.parse() {
                pg.max_connections = v;
            }
        }
    }

    // Logging overrides
    if let Some(level) = var("RUST_LOG") {
        config.log.level = level;
    }
    if let Some(format) = var("LOG_FORMAT") {
        if let Ok(v) = format.parse() {
            config.log.format = v;
        }
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    super::paths::ensure_parent(path)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.gateway.history_limit = 20;
        config.identity.user_id = Some("user-1".to_string());
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.gateway.history_limit, 20);
        assert_eq!(loaded.identity.user_id.as_deref(), Some("user-1"));
        assert_eq!(loaded.probe.timeout, config.probe.timeout);
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.gateway.session_key, "default");
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ gateway: ").unwrap();

        assert!(matches!(load_config_from_path(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ANIMA_USER_ID", "owner-42"),
            ("ANIMA_HISTORY_LIMIT", "10"),
            ("ANIMA_PROBE_TIMEOUT", "2s"),
            ("ANIMA_IDLESS_EVENTS", "fresh"),
            ("DATABASE_URL", "postgres://localhost/anima"),
            ("LOG_FORMAT", "json"),
        ]);

        let mut config = Config::default();
        apply_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.identity.user_id.as_deref(), Some("owner-42"));
        assert_eq!(config.gateway.history_limit, 10);
        assert_eq!(config.probe.timeout, Duration::from_secs(2));
        assert_eq!(config.gateway.idless_events, IdlessEventPolicy::Fresh);
        assert_eq!(config.directory.backend, DirectoryBackendType::Postgres);
        assert_eq!(
            config.directory.postgres.as_ref().unwrap().url.expose_secret(),
            "postgres://localhost/anima"
        );
        assert_eq!(config.log.format, crate::config::LogFormat::Json);
    }

    #[test]
    fn test_bad_override_values_are_ignored() {
        let mut config = Config::default();
        apply_overrides(&mut config, |k| match k {
            "ANIMA_HISTORY_LIMIT" => Some("lots".to_string()),
            "ANIMA_PROBE_TIMEOUT" => Some("soon".to_string()),
            "ANIMA_USER_ID" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.gateway.history_limit, 50);
        assert_eq!(config.probe.timeout, Duration::from_secs(5));
        assert!(config.identity.user_id.is_none());
    }
}
