//! Configuration validation
//!
//! Validates configuration and reports issues.

use secrecy::ExposeSecret;

use super::types::storage::DirectoryBackendType;
use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_gateway_config(config, result);
    result = validate_probe_config(config, result);
    result = validate_directory_config(config, result);
    result = validate_identity_config(config, result);

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let gateway = &config.gateway;

    if gateway.min_protocol > gateway.max_protocol {
        result = result.with_error(
            ValidationIssue::new(
                "gateway.minProtocol",
                format!(
                    "minProtocol ({}) is greater than maxProtocol ({})",
                    gateway.min_protocol, gateway.max_protocol
                ),
            )
            .with_suggestion("Set minProtocol <= maxProtocol"),
        );
    }

    if gateway.history_limit == 0 {
        result = result.with_warning(
            ValidationIssue::new("gateway.historyLimit", "History limit is 0; no history will be loaded")
                .with_suggestion("Use a positive limit such as 50"),
        );
    }

    if gateway.client_id.trim().is_empty() {
        result = result.with_error(ValidationIssue::new("gateway.clientId", "Client id must not be empty"));
    }

    if gateway.session_key.trim().is_empty() {
        result = result.with_error(ValidationIssue::new("gateway.sessionKey", "Session key must not be empty"));
    }

    result
}

fn validate_probe_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.probe.timeout.is_zero() {
        result = result.with_error(
            ValidationIssue::new("probe.timeout", "Probe timeout must be greater than zero")
                .with_suggestion("Use a duration such as \"5s\""),
        );
    }

    result
}

fn validate_directory_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.directory.backend == DirectoryBackendType::Postgres {
        let has_url = config
            .directory
            .postgres
            .as_ref()
            .is_some_and(|pg| !pg.url.expose_secret().is_empty());

        if !has_url {
            result = result.with_error(
                ValidationIssue::new(
                    "directory.postgres",
                    "PostgreSQL directory selected but no database URL configured",
                )
                .with_suggestion("Set DATABASE_URL environment variable or configure directory.postgres"),
            );
        }
    }

    result
}

fn validate_identity_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.identity.user_id.is_none() {
        result = result.with_warning(
            ValidationIssue::new("identity.userId", "No user is signed in; setup and chat will be refused")
                .with_suggestion("Set ANIMA_USER_ID or identity.userId"),
        );
    }

    result
}
