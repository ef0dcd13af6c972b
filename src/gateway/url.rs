//! Gateway URL handling
//!
//! The credential travels as the `token` query parameter next to `clientId`.
//! URLs built here carry the plaintext token and must never be logged; use
//! [`redact`] for anything that ends up in a log line.

use url::Url;

use crate::error::{Error, Result};

/// Parse a gateway base URL, accepting only `ws` and `wss`
pub fn parse_gateway_url(base: &str) -> Result<Url> {
    let url = Url::parse(base.trim())?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::InvalidInput(format!(
            "gateway URL must use ws:// or wss://, got {}://",
            other
        ))),
    }
}

/// Attach `token` and `clientId` to a gateway URL.
/// Existing values of either parameter are replaced; other parameters are kept.
pub fn gateway_url_with_credentials(base: &str, token: &str, client_id: &str) -> Result<Url> {
    let mut url = parse_gateway_url(base)?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token" && k != "clientId")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("token", token)
        .append_pair("clientId", client_id);

    Ok(url)
}

/// Loggable form of a gateway URL: scheme, host, port and path only
pub fn redact(url: &Url) -> String {
    let mut shown = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        shown.push_str(&format!(":{}", port));
    }
    if url.path() != "/" {
        shown.push_str(url.path());
    }
    shown
}
