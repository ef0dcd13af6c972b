//! Console launch
//!
//! Resolve the signed-in user's agent and start a gateway session for it.

use std::sync::Arc;
use tracing::info;

use crate::config::GatewayConfig;
use crate::directory::{AgentDirectory, AgentRecord, IdentityProvider};
use crate::error::{Error, Result};
use crate::gateway::SessionClient;
use crate::vault::TokenVault;

/// Outcome of opening the console
#[derive(Debug)]
pub enum ConsoleLaunch {
    /// The user has no agent yet; run setup first
    NeedsSetup,
    /// Session started for the user's agent
    Ready {
        record: AgentRecord,
        session: SessionClient,
    },
}

/// Open the console for the signed-in user
pub async fn open_console(
    identity: &dyn IdentityProvider,
    directory: &dyn AgentDirectory,
    vault: Arc<TokenVault>,
    config: &GatewayConfig,
) -> Result<ConsoleLaunch> {
    let owner_id = identity
        .current_user()
        .await?
        .ok_or_else(|| Error::Unauthorized("Not authenticated".into()))?;

    let Some(record) = directory.get(&owner_id).await? else {
        info!("No agent configured for {}", owner_id);
        return Ok(ConsoleLaunch::NeedsSetup);
    };

    info!("Opening console for agent {} ({})", record.name, record.id);
    let session = SessionClient::connect(&record, vault, config.clone());
    Ok(ConsoleLaunch::Ready { record, session })
}
