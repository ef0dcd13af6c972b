//! Configuration paths
//!
//! Utilities for resolving configuration and device-local state paths.

use std::path::{Path, PathBuf};

/// Name of the device-local slot holding the exported vault key
pub const VAULT_KEY_FILE: &str = "anima_local_key";

/// Name of the file-backed agent directory
pub const AGENTS_FILE: &str = "agents.json";

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("ANIMA_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("anima"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("anima"))
                .unwrap_or_else(|| PathBuf::from(".anima"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    // Check for explicit override
    if let Ok(path) = std::env::var("ANIMA_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.json")
}

/// Get the state directory (vault key, local agent directory)
pub fn state_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("ANIMA_STATE_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG data directory or fallback
    dirs::data_dir()
        .map(|d| d.join("anima"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share").join("anima"))
                .unwrap_or_else(|| PathBuf::from(".anima"))
        })
}

/// Default location of the device vault key
pub fn vault_key_path() -> PathBuf {
    state_dir().join(VAULT_KEY_FILE)
}

/// Default location of the file-backed agent directory
pub fn agents_path() -> PathBuf {
    state_dir().join(AGENTS_FILE)
}

/// Ensure the parent directory of a file exists
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
