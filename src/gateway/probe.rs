//! One-shot gateway reachability check
//!
//! Opens a socket with the candidate credential, closes it as soon as the
//! handshake completes and reports the outcome. No application frames are
//! sent. Used before a new agent configuration is persisted.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use super::url::{gateway_url_with_credentials, redact};
use crate::config::ProbeConfig;
use crate::error::{Error, Result};

/// Shown when the gateway refuses the socket or the handshake fails
pub const REFUSED_MESSAGE: &str =
    "WebSocket connection refused. Check your URL, Token, and ensure the Gateway is running.";

/// Shown when the handshake does not finish within `timeout`
pub fn timeout_message(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 {
        let secs = timeout.as_secs();
        let unit = if secs == 1 { "second" } else { "seconds" };
        format!("Connection timed out after {} {}.", secs, unit)
    } else {
        format!("Connection timed out after {} ms.", timeout.as_millis())
    }
}

/// Check that a gateway accepts a socket with `token`.
///
/// Returns `Ok(())` once the socket opens, [`Error::HandshakeTimeout`] if it
/// does not open within the configured timeout, and
/// [`Error::HandshakeRefused`] on any socket or handshake failure. URLs that
/// are not `ws://`/`wss://` fail before any socket is created.
pub async fn probe(gateway_url: &str, token: &SecretString, config: &ProbeConfig) -> Result<()> {
    let url = gateway_url_with_credentials(gateway_url, token.expose_secret(), &config.client_id)?;
    info!("Probing gateway at {}", redact(&url));

    match tokio::time::timeout(config.timeout, connect_async(url.as_str())).await {
        Err(_) => {
            warn!("Gateway probe timed out after {:?}", config.timeout);
            Err(Error::HandshakeTimeout(timeout_message(config.timeout)))
        }
        Ok(Err(e)) => {
            warn!("Gateway probe failed: {}", e);
            Err(Error::HandshakeRefused(REFUSED_MESSAGE.to_string()))
        }
        Ok(Ok((mut ws, _))) => {
            if let Err(e) = ws.close(None).await {
                debug!("Error closing probe socket: {}", e);
            }
            info!("Gateway probe succeeded");
            Ok(())
        }
    }
}
