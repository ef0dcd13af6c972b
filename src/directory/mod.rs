//! Agent directory - where agent records and their encrypted tokens live
//!
//! The directory only ever sees `gateway_token_encrypted`, the vault's blob.
//! It is a collaborator, not part of the session core, so it is abstracted
//! behind [`AgentDirectory`] with two backends:
//!
//! - **file**: `agents.json` in the state directory (single user, no server)
//! - **postgres**: an `agents` table, for shared deployments
//!
//! [`IdentityProvider`] answers "who is signed in"; [`StaticIdentity`] reads
//! it from configuration.

mod file;
mod postgres;

pub use file::JsonFileDirectory;
pub use postgres::PostgresDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{DirectoryBackendType, DirectoryConfig, IdentityConfig};
use crate::error::{Error, Result};

/// A configured agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentRecord {
    pub id: Uuid,
    /// User who owns the agent
    pub owner_id: String,
    /// Display name
    pub name: String,
    /// `ws://` or `wss://` gateway endpoint
    pub gateway_url: String,
    /// Vault blob (base64); never the plaintext token
    pub gateway_token_encrypted: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert shape of an [`AgentRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgentRecord {
    pub owner_id: String,
    pub name: String,
    pub gateway_url: String,
    pub gateway_token_encrypted: String,
    pub is_active: bool,
}

impl NewAgentRecord {
    /// Materialize with a fresh id and the current time
    pub fn into_record(self) -> AgentRecord {
        AgentRecord {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            name: self.name,
            gateway_url: self.gateway_url,
            gateway_token_encrypted: self.gateway_token_encrypted,
            is_active: self.is_active,
            created_at: Utc::now(),
        }
    }
}

/// Persistence for agent records
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Backend name for logs
    fn id(&self) -> &str;

    /// The agent a console for `owner_id` should open: the newest active
    /// record, or `None` if the owner has not set one up.
    async fn get(&self, owner_id: &str) -> Result<Option<AgentRecord>>;

    /// Store a new record, returning its id
    async fn insert(&self, record: NewAgentRecord) -> Result<Uuid>;
}

/// Source of the signed-in user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<String>>;
}

/// Identity fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: Option<String>) -> Self {
        StaticIdentity { user_id }
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self::new(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.user_id.clone())
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<String>> {
        Ok(self.user_id.clone())
    }
}

/// Open the configured directory backend
pub async fn open_directory(config: &DirectoryConfig) -> Result<Arc<dyn AgentDirectory>> {
    match config.backend {
        DirectoryBackendType::File => Ok(Arc::new(JsonFileDirectory::new(config.file_path()))),
        DirectoryBackendType::Postgres => {
            let pg = config.postgres.as_ref().ok_or_else(|| {
                Error::Config("directory backend is postgres but no database is configured".into())
            })?;
            let directory = PostgresDirectory::connect(pg).await?;
            directory.migrate().await?;
            Ok(Arc::new(directory))
        }
    }
}

/// Newest active record among `records` owned by `owner_id`
pub(crate) fn select_active<'a>(
    records: impl IntoIterator<Item = &'a AgentRecord>,
    owner_id: &str,
) -> Option<&'a AgentRecord> {
    records
        .into_iter()
        .filter(|r| r.owner_id == owner_id && r.is_active)
        .max_by_key(|r| r.created_at)
}
