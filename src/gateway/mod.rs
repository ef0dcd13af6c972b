//! Gateway module - client side of the agent gateway control plane
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Agent Gateway                     │
//! │              ws://localhost:18789                    │
//! └───────────────────────┬─────────────────────────────┘
//!                         │ req / res / event
//!           ┌─────────────┴─────────────┐
//!           │                           │
//!           ▼                           ▼
//!     ┌───────────┐              ┌─────────────┐
//!     │   Probe   │              │   Session   │
//!     │ (setup)   │              │  (console)  │
//!     └───────────┘              └─────────────┘
//! ```
//!
//! - **protocol**: envelope codec and typed params/results
//! - **session**: long-lived session actor and its handle
//! - **state**: connection state machine
//! - **probe**: one-shot handshake check
//! - **url**: credential query parameters and log redaction

pub mod probe;
pub mod protocol;
pub mod session;
pub mod state;
pub mod url;

pub use probe::probe;
pub use protocol::{Envelope, ParseError, PROTOCOL_VERSION};
pub use session::{SessionClient, SessionCore, SessionSnapshot};
pub use state::{ConnectionState, StateMachine};
pub use url::gateway_url_with_credentials;
