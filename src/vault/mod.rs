//! Token vault - zero-knowledge storage of gateway credentials
//!
//! The gateway token is encrypted on this device with a device-local
//! AES-256-GCM key before it is handed to the agent directory, so the
//! directory only ever stores an opaque blob.
//!
//! ## Layout
//!
//! - **key_store**: the persisted key slot (`FileKeyStore`, `MemoryKeyStore`)
//! - **cipher**: `VaultKey` and the `nonce ‖ ciphertext ‖ tag` blob format
//!
//! ## Usage
//!
//! ```rust,no_run
//! use anima::vault::{FileKeyStore, TokenVault};
//! use secrecy::{ExposeSecret, SecretString};
//!
//! # async fn example() -> anima::Result<()> {
//! let vault = TokenVault::new(FileKeyStore::new("/tmp/anima_local_key"));
//! let stored = vault.encrypt_token(&SecretString::from("gw-token")).await?;
//! let token = vault.decrypt_token(&stored).await?;
//! assert_eq!(token.expose_secret(), "gw-token");
//! # Ok(())
//! # }
//! ```

mod cipher;
mod key_store;

pub use cipher::{EncryptedBlob, VaultKey, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use key_store::{FileKeyStore, KeyStore, MemoryKeyStore};

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::VaultConfig;
use crate::error::Result;

/// Owns the device key and encrypts/decrypts gateway tokens with it
pub struct TokenVault {
    store: Arc<dyn KeyStore>,
    key: OnceCell<VaultKey>,
}

impl TokenVault {
    /// Create a vault over the given key store
    pub fn new(store: impl KeyStore + 'static) -> Self {
        TokenVault {
            store: Arc::new(store),
            key: OnceCell::new(),
        }
    }

    /// Create a vault using the configured key file
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(FileKeyStore::new(config.key_path()))
    }

    /// Vault whose key lives only in memory
    pub fn ephemeral() -> Self {
        Self::new(MemoryKeyStore::new())
    }

    /// Return the device key, generating and persisting it on first use.
    ///
    /// Concurrent first calls on one vault are serialized by the cell; calls
    /// from separate vaults or processes sharing a slot are reconciled by the
    /// store's create-if-absent write.
    pub async fn get_or_create_key(&self) -> Result<&VaultKey> {
        self.key.get_or_try_init(|| self.load_or_create()).await
    }

    async fn load_or_create(&self) -> Result<VaultKey> {
        if let Some(encoded) = self.store.load().await? {
            debug!("Loaded vault key from {} store", self.store.id());
            return VaultKey::from_base64(&encoded);
        }

        let (key, encoded) = VaultKey::generate()?;
        let persisted = self.store.store_if_absent(&encoded).await?;
        if persisted == encoded {
            info!("Generated new device vault key ({} store)", self.store.id());
            Ok(key)
        } else {
            debug!("Lost vault key creation race, adopting persisted key");
            VaultKey::from_base64(&persisted)
        }
    }

    /// Encrypt a token into its base64 storage form
    pub async fn encrypt_token(&self, token: &SecretString) -> Result<String> {
        let key = self.get_or_create_key().await?;
        Ok(key.encrypt(token.expose_secret())?.to_base64())
    }

    /// Decrypt a base64 blob produced by [`TokenVault::encrypt_token`]
    pub async fn decrypt_token(&self, encrypted: &str) -> Result<SecretString> {
        let blob = EncryptedBlob::from_base64(encrypted)?;
        let key = self.get_or_create_key().await?;
        key.decrypt(&blob).map(SecretString::from)
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault")
            .field("store", &self.store.id())
            .field("key_loaded", &self.key.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Store wrapper counting writes
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryKeyStore,
        writes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl KeyStore for CountingStore {
        fn id(&self) -> &str {
            "counting"
        }

        async fn load(&self) -> Result<Option<String>> {
            self.inner.load().await
        }

        async fn store_if_absent(&self, encoded: &str) -> Result<String> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.store_if_absent(encoded).await
        }
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let vault = TokenVault::ephemeral();
        let stored = vault.encrypt_token(&SecretString::from("gw-token")).await.unwrap();
        assert_ne!(stored, "gw-token");

        let token = vault.decrypt_token(&stored).await.unwrap();
        assert_eq!(token.expose_secret(), "gw-token");
    }

    #[tokio::test]
    async fn test_concurrent_first_use_creates_one_key() {
        let writes = Arc::new(AtomicUsize::new(0));
        let vault = Arc::new(TokenVault::new(CountingStore {
            inner: MemoryKeyStore::new(),
            writes: writes.clone(),
        }));

        let mut handles = Vec::new();
        for i in 0..16 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                vault
                    .encrypt_token(&SecretString::from(format!("token-{}", i)))
                    .await
                    .unwrap()
            }));
        }

        let mut blobs = Vec::new();
        for handle in handles {
            blobs.push(handle.await.unwrap());
        }

        assert_eq!(writes.load(Ordering::SeqCst), 1);
        for (i, blob) in blobs.iter().enumerate() {
            let token = vault.decrypt_token(blob).await.unwrap();
            assert_eq!(token.expose_secret(), format!("token-{}", i));
        }
    }

    #[tokio::test]
    async fn test_separate_vaults_share_one_file_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anima_local_key");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                let vault = TokenVault::new(FileKeyStore::new(path));
                vault.encrypt_token(&SecretString::from("shared")).await.unwrap()
            }));
        }

        let reopened = TokenVault::new(FileKeyStore::new(&path));
        for handle in handles {
            let blob = handle.await.unwrap();
            let token = reopened.decrypt_token(&blob).await.unwrap();
            assert_eq!(token.expose_secret(), "shared");
        }
    }

    #[tokio::test]
    async fn test_key_survives_restart() {
        let dir = tempdir().unwrap();
        let config = VaultConfig {
            key_path: Some(dir.path().join("key")),
        };

        let stored = TokenVault::from_config(&config)
            .encrypt_token(&SecretString::from("persisted"))
            .await
            .unwrap();

        let token = TokenVault::from_config(&config).decrypt_token(&stored).await.unwrap();
        assert_eq!(token.expose_secret(), "persisted");
    }

    #[tokio::test]
    async fn test_other_device_cannot_decrypt() {
        let stored = TokenVault::ephemeral()
            .encrypt_token(&SecretString::from("mine"))
            .await
            .unwrap();

        let err = TokenVault::ephemeral().decrypt_token(&stored).await.unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
        assert!(err.requires_new_credential());
    }

    #[tokio::test]
    async fn test_corrupted_stored_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "definitely-not-a-key").unwrap();

        let vault = TokenVault::new(FileKeyStore::new(path));
        assert!(matches!(vault.get_or_create_key().await, Err(Error::Vault(_))));
    }
}
