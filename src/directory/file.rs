//! JSON file agent directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{select_active, AgentDirectory, AgentRecord, NewAgentRecord};
use crate::config::paths::ensure_parent;
use crate::error::Result;

/// Agent records kept as a JSON array in one file
#[derive(Debug)]
pub struct JsonFileDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileDirectory {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<AgentRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the file contents via a sibling temp file and rename
    async fn write_all(&self, records: &[AgentRecord]) -> Result<()> {
        ensure_parent(&self.path)?;
        let tmp = self.path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl AgentDirectory for JsonFileDirectory {
    fn id(&self) -> &str {
        "file"
    }

    async fn get(&self, owner_id: &str) -> Result<Option<AgentRecord>> {
        let records = self.read_all().await?;
        debug!("Read {} agent records from {}", records.len(), self.path.display());
        Ok(select_active(&records, owner_id).cloned())
    }

    async fn insert(&self, record: NewAgentRecord) -> Result<Uuid> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_all().await?;
        let record = record.into_record();
        let id = record.id;
        records.push(record);
        self.write_all(&records).await?;

        info!("Saved agent {} to {}", id, self.path.display());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    fn new_record(owner: &str, name: &str) -> NewAgentRecord {
        NewAgentRecord {
            owner_id: owner.to_string(),
            name: name.to_string(),
            gateway_url: "ws://localhost:18789".to_string(),
            gateway_token_encrypted: "b64blob".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let directory = JsonFileDirectory::new(dir.path().join("agents.json"));
        assert!(directory.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("agents.json");
        let directory = JsonFileDirectory::new(&path);

        let id = directory.insert(new_record("u1", "Lumi Local")).await.unwrap();
        let record = directory.get("u1").await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.name, "Lumi Local");
        assert!(record.is_active);
        assert!(directory.get("u2").await.unwrap().is_none());

        // Persisted for a fresh instance
        let reopened = JsonFileDirectory::new(&path);
        assert_eq!(reopened.get("u1").await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_newest_record_wins() {
        let dir = tempdir().unwrap();
        let directory = JsonFileDirectory::new(dir.path().join("agents.json"));

        directory.insert(new_record("u1", "first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = directory.insert(new_record("u1", "second")).await.unwrap();

        assert_eq!(directory.get("u1").await.unwrap().unwrap().id, second);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, "{not json").unwrap();

        let directory = JsonFileDirectory::new(&path);
        assert!(matches!(directory.get("u1").await, Err(Error::Json(_))));
    }
}
