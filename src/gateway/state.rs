//! Connection state machine
//!
//! ```text
//! decrypting ──► connecting ──► connected ──► disconnected
//!      │              │             │
//!      └──────────────┴─────────────┴───────► error
//! ```
//!
//! `disconnected` and `error` are terminal for a session instance. Retrying
//! means building a new session.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of one gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Stored credential is being decrypted
    Decrypting,
    /// Socket handshake in flight
    Connecting,
    /// Socket open; requests may be sent
    Connected,
    /// Socket closed
    Disconnected,
    /// Vault, URL or socket failure
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Decrypting => "decrypting",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::{Connected, Connecting, Decrypting, Disconnected};
        matches!(
            (self, next),
            (Decrypting, Connecting)
                | (Decrypting, ConnectionState::Error)
                | (Connecting, Connected)
                | (Connecting, ConnectionState::Error)
                | (Connected, Disconnected)
                | (Connected, ConnectionState::Error)
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Decrypting
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus the path taken to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    current: ConnectionState,
    history: Vec<ConnectionState>,
}

impl StateMachine {
    /// Start in `decrypting`
    pub fn new() -> Self {
        StateMachine {
            current: ConnectionState::Decrypting,
            history: vec![ConnectionState::Decrypting],
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[ConnectionState] {
        &self.history
    }

    /// Move to `next`, rejecting skips and re-entry
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(Error::StateTransition(format!("{} -> {}", self.current, next)));
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Route any failure to `error`. No-op if already terminal.
    pub fn fail(&mut self) -> bool {
        self.transition(ConnectionState::Error).is_ok()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::{Connected, Connecting, Decrypting, Disconnected};

    const FAILED: ConnectionState = ConnectionState::Error;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        sm.transition(Connecting).unwrap();
        sm.transition(Connected).unwrap();
        sm.transition(Disconnected).unwrap();
        assert_eq!(sm.history(), [Decrypting, Connecting, Connected, Disconnected]);
    }

    #[test]
    fn test_no_skips() {
        let mut sm = StateMachine::new();
        assert!(matches!(sm.transition(Connected), Err(Error::StateTransition(_))));
        assert_eq!(sm.current(), Decrypting);

        sm.transition(Connecting).unwrap();
        assert!(sm.transition(Disconnected).is_err());
    }

    #[test]
    fn test_terminal_states_stay_terminal() {
        for terminal in [Disconnected, FAILED] {
            assert!(terminal.is_terminal());
            for next in [Decrypting, Connecting, Connected, Disconnected, FAILED] {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_fail_from_each_live_state() {
        for path in [vec![], vec![Connecting], vec![Connecting, Connected]] {
            let mut sm = StateMachine::new();
            for state in path {
                sm.transition(state).unwrap();
            }
            assert!(sm.fail());
            assert_eq!(sm.current(), FAILED);
            assert!(!sm.fail());
        }
    }

    #[test]
    fn test_connected_always_preceded_by_connecting() {
        let mut sm = StateMachine::new();
        sm.transition(Connecting).unwrap();
        sm.transition(Connected).unwrap();
        let history = sm.history();
        let pos = history.iter().position(|s| *s == Connected).unwrap();
        assert_eq!(history[pos - 1], Connecting);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Connected).unwrap(), "\"connected\"");
    }
}
