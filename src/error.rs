//! Error types for Anima

use thiserror::Error;

/// Result type alias using Anima's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Anima
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vault blob did not authenticate (wrong key, tampered or corrupted blob)
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Vault key material could not be created or loaded
    #[error("Vault error: {0}")]
    Vault(String),

    /// Probe did not see the socket open before the deadline
    #[error("Handshake timed out: {0}")]
    HandshakeTimeout(String),

    /// Probe socket was refused or failed during the handshake
    #[error("Handshake refused: {0}")]
    HandshakeRefused(String),

    /// Socket failure or send attempted outside the connected state
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed inbound frame
    #[error("Parse error: {0}")]
    Parse(String),

    /// Illegal connection state transition
    #[error("Invalid state transition: {0}")]
    StateTransition(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No signed-in user
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::Url(_)
                | Error::Unauthorized(_)
                | Error::HandshakeRefused(_)
        )
    }

    /// Whether the user can fix this by re-entering the agent credential
    pub fn requires_new_credential(&self) -> bool {
        matches!(self, Error::Decryption(_) | Error::HandshakeRefused(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::HandshakeRefused("no".into()).is_client_error());
        assert!(Error::HandshakeRefused("no".into()).requires_new_credential());
        assert!(Error::Decryption("tag".into()).requires_new_credential());
        assert!(!Error::Decryption("tag".into()).is_client_error());
        assert!(!Error::Transport("closed".into()).is_client_error());
        assert!(!Error::Transport("closed".into()).requires_new_credential());
    }
}
