//! AES-256-GCM primitives for the token vault

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Error, Result};

/// Raw key length in bytes (256 bits)
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Device-local symmetric key
pub struct VaultKey {
    cipher: Aes256Gcm,
}

impl VaultKey {
    /// Generate a fresh key, returning it with its exported (base64) form
    pub fn generate() -> Result<(Self, String)> {
        let mut raw = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut raw)
            .map_err(|e| Error::Vault(format!("OS random source unavailable: {}", e)))?;

        let key = Self::from_bytes(&raw)?;
        Ok((key, STANDARD.encode(raw)))
    }

    /// Import a key from its raw bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != KEY_LEN {
            return Err(Error::Vault(format!(
                "Vault key must be {} bytes, got {}",
                KEY_LEN,
                raw.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(raw)
            .map_err(|_| Error::Vault("Invalid vault key length".to_string()))?;
        Ok(VaultKey { cipher })
    }

    /// Import a key from its exported (base64) form
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Vault(format!("Stored vault key is not valid base64: {}", e)))?;
        Self::from_bytes(&raw)
    }

    /// Encrypt `plaintext` under a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedBlob> {
        // Nonces never repeat under one key; no fallback source.
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| Error::Vault(format!("OS random source unavailable: {}", e)))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| Error::Vault("Encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(EncryptedBlob(combined))
    }

    /// Authenticate and decrypt a blob produced by [`VaultKey::encrypt`]
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<String> {
        let (nonce, ciphertext) = blob.0.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                Error::Decryption(
                    "authentication tag did not verify (wrong device key or corrupted token)"
                        .to_string(),
                )
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("decrypted token is not valid UTF-8".to_string()))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// `nonce ‖ ciphertext ‖ tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    /// Wrap raw blob bytes, rejecting anything too short to hold a nonce and tag
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Decryption(format!(
                "encrypted token is truncated ({} bytes)",
                bytes.len()
            )));
        }
        Ok(EncryptedBlob(bytes))
    }

    /// Parse the base64 storage form
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Decryption(format!("encrypted token is not valid base64: {}", e)))?;
        Self::from_bytes(bytes)
    }

    /// Base64 storage form
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// The nonce prefix
    pub fn nonce(&self) -> &[u8] {
        &self.0[..NONCE_LEN]
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key() -> VaultKey {
        VaultKey::generate().unwrap().0
    }

    #[test]
    fn test_roundtrip() {
        let key = key();
        let long = "x".repeat(4096);
        for s in ["", "gw_token_123", "ünïcødé 🔑", long.as_str()] {
            let blob = key.encrypt(s).unwrap();
            assert_eq!(key.decrypt(&blob).unwrap(), s);
        }
    }

    #[test]
    fn test_blob_layout() {
        let key = key();
        let blob = key.encrypt("abc").unwrap();
        assert_eq!(blob.as_bytes().len(), NONCE_LEN + 3 + TAG_LEN);
        assert_eq!(blob.nonce().len(), NONCE_LEN);

        let parsed = EncryptedBlob::from_base64(&blob.to_base64()).unwrap();
        assert_eq!(parsed, blob);
    }

    #[test]
    fn test_ciphertext_is_not_plaintext() {
        let key = key();
        let blob = key.encrypt("super-secret-token").unwrap();
        assert!(!blob.to_base64().contains("super-secret-token"));
        assert!(!blob.as_bytes().windows(6).any(|w| w == b"secret"));
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let key = key();
        let blob = key.encrypt("token").unwrap();
        let bytes = blob.as_bytes().to_vec();

        for i in 0..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[i] ^= 1 << bit;
                let tampered = EncryptedBlob::from_bytes(tampered).unwrap();
                assert!(
                    matches!(key.decrypt(&tampered), Err(Error::Decryption(_))),
                    "flip at byte {} bit {} was not detected",
                    i,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = key().encrypt("token").unwrap();
        assert!(matches!(key().decrypt(&blob), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = key();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let blob = key.encrypt("t").unwrap();
            assert!(seen.insert(blob.nonce().to_vec()));
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_same_plaintext_differs() {
        let key = key();
        assert_ne!(key.encrypt("same").unwrap(), key.encrypt("same").unwrap());
    }

    #[test]
    fn test_malformed_blobs() {
        assert!(matches!(EncryptedBlob::from_base64("not base64!!"), Err(Error::Decryption(_))));
        assert!(matches!(EncryptedBlob::from_bytes(vec![0; 27]), Err(Error::Decryption(_))));
        assert!(EncryptedBlob::from_bytes(vec![0; 28]).is_ok());
    }

    #[test]
    fn test_key_import_export() {
        let (key, exported) = VaultKey::generate().unwrap();
        let imported = VaultKey::from_base64(&exported).unwrap();
        let blob = key.encrypt("shared").unwrap();
        assert_eq!(imported.decrypt(&blob).unwrap(), "shared");

        assert!(VaultKey::from_bytes(&[0u8; 16]).is_err());
        assert!(VaultKey::from_base64("%%%").is_err());
        assert_eq!(format!("{:?}", key), "VaultKey([REDACTED])");
    }
}
