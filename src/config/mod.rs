//! Configuration module
//!
//! Split into focused modules:
//! - types/mod.rs: Core configuration types (Config, GatewayConfig, ProbeConfig, ...)
//! - types/storage.rs: Agent directory and vault configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration and state file paths

mod io;
pub mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{
    Config, GatewayConfig, IdentityConfig, IdlessEventPolicy, LogConfig, LogFormat, ProbeConfig,
};

// Re-export storage types
pub use types::storage::{DirectoryBackendType, DirectoryConfig, PostgresConfig, VaultConfig};

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, state_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
