//! Device-local key slot
//!
//! A [`KeyStore`] holds exactly one exported vault key (base64 of the raw
//! 32 bytes). Writes are create-if-absent so two racing first uses end up
//! agreeing on a single key.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Abstract interface for the persisted key slot
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Get the store ID (for logs)
    fn id(&self) -> &str;

    /// Read the exported key, if one has been persisted
    async fn load(&self) -> Result<Option<String>>;

    /// Persist `encoded` unless a key is already present.
    ///
    /// Returns the value the slot holds afterwards: `encoded` when this call
    /// won, or the previously stored key when it lost.
    async fn store_if_absent(&self, encoded: &str) -> Result<String>;
}

/// Key slot backed by a single file
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Create a store for the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileKeyStore { path: path.into() }
    }

    /// Location of the key file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_slot(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    return Err(Error::Vault(format!(
                        "Key slot {} exists but is empty",
                        self.path.display()
                    )));
                }
                Ok(Some(trimmed.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    fn id(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Option<String>> {
        self.read_slot().await
    }

    async fn store_if_absent(&self, encoded: &str) -> Result<String> {
        crate::config::paths::ensure_parent(&self.path)?;

        // Write the full key to a private temp file, then hard-link it into
        // place. `hard_link` refuses to replace an existing file, so the slot
        // is never observed half-written and never overwritten.
        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        let written = write_private(&tmp, encoded).await;
        let linked = match written {
            Ok(()) => tokio::fs::hard_link(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => {
                debug!("Persisted vault key to {}", self.path.display());
                Ok(encoded.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("Vault key already present at {}, adopting it", self.path.display());
                self.read_slot().await?.ok_or_else(|| {
                    Error::Vault(format!("Key slot {} vanished during creation", self.path.display()))
                })
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Create `path` (which must not exist) readable by the owner only, and
/// write `content` to it. The mode is set at creation.
async fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await
}

/// In-memory key slot; the key lives as long as the store
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<String>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn id(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Option<String>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn store_if_absent(&self, encoded: &str) -> Result<String> {
        let mut slot = self.slot.lock().await;
        Ok(slot.get_or_insert_with(|| encoded.to_string()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("nested").join("anima_local_key"));

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.store_if_absent("first").await.unwrap(), "first");
        assert_eq!(store.load().await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_file_store_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("key"));

        store.store_if_absent("first").await.unwrap();
        assert_eq!(store.store_if_absent("second").await.unwrap(), "first");
        assert_eq!(store.load().await.unwrap().as_deref(), Some("first"));

        // No temp files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("key"));
        store.store_if_absent("secret").await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_temp_file_is_private_from_creation() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("key.tmp");
        write_private(&path, "secret").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "secret");

        // Never reuses an existing file
        assert!(write_private(&path, "other").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_store_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::create_dir(&path).unwrap();

        let store = FileKeyStore::new(&path);
        assert!(store.store_if_absent("secret").await.is_err());

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_slot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "  \n").unwrap();

        let store = FileKeyStore::new(path);
        assert!(matches!(store.load().await, Err(Error::Vault(_))));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryKeyStore::new();
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.store_if_absent("a").await.unwrap(), "a");
        assert_eq!(store.store_if_absent("b").await.unwrap(), "a");
    }
}
