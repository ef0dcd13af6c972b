//! PostgreSQL agent directory

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{AgentDirectory, AgentRecord, NewAgentRecord};
use crate::config::PostgresConfig;
use crate::error::Result;

/// Agent records in an `agents` table
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Use an existing pool
    pub fn new(pool: PgPool) -> Self {
        PostgresDirectory { pool }
    }

    /// Open a pool and verify the connection
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        info!("Initializing PostgreSQL connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(config.url.expose_secret())
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        info!("PostgreSQL connection pool initialized successfully");
        Ok(Self::new(pool))
    }

    /// Create the `agents` table if needed
    pub async fn migrate(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AgentDirectory for PostgresDirectory {
    fn id(&self) -> &str {
        "postgres"
    }

    async fn get(&self, owner_id: &str) -> Result<Option<AgentRecord>> {
        let record: Option<AgentRecord> = sqlx::query_as(
            r#"
            SELECT id, owner_id, name, gateway_url, gateway_token_encrypted, is_active, created_at
            FROM agents
            WHERE owner_id = $1 AND is_active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn insert(&self, record: NewAgentRecord) -> Result<Uuid> {
        let record = record.into_record();
        sqlx::query(
            r#"
            INSERT INTO agents
                (id, owner_id, name, gateway_url, gateway_token_encrypted, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.name)
        .bind(&record.gateway_url)
        .bind(&record.gateway_token_encrypted)
        .bind(record.is_active)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        info!("Saved agent {} to postgres", record.id);
        Ok(record.id)
    }
}

/// Database migrations
pub mod migrations {
    use super::*;

    /// Run all migrations
    pub async fn run(pool: &PgPool) -> Result<()> {
        info!("Running agent directory migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id UUID PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                gateway_url TEXT NOT NULL,
                gateway_token_encrypted TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agents_owner ON agents(owner_id, created_at DESC)",
        )
        .execute(pool)
        .await?;

        info!("Agent directory migrations complete");
        Ok(())
    }
}
