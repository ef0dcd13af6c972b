//! Logging bootstrap
//!
//! Installs a `tracing-subscriber` formatter writing to stderr, so it never
//! interleaves with console output on stdout.

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};
use crate::error::{Error, Result};

/// Build the filter for a level string such as `info,anima=debug`
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| Error::Config(format!("Invalid log filter {:?}: {}", level, e)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level)?)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Pretty => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install logger: {}", e)))
}
