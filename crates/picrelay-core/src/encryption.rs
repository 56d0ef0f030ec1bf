//! Encryption service for document bodies (credentials, upload history)

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use std::env;

/// Errors raised while encrypting or decrypting a document body.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Encryption key must be 32 bytes (256 bits)")]
    InvalidKeyLength,

    #[error("PICRELAY_ENCRYPTION_KEY environment variable not set")]
    MissingKey,

    #[error("Failed to decode key or ciphertext: {0}")]
    Decode(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// AES-256-GCM authenticated encryption for store documents.
///
/// Ciphertext layout is `base64(nonce || ciphertext)` with a 12-byte nonce.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Create a new encryption service from a raw 32-byte key (e.g. for tests).
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, EncryptionError> {
        if key_bytes.len() != 32 {
            return Err(EncryptionError::InvalidKeyLength);
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Create a new encryption service from the environment.
    /// Expects PICRELAY_ENCRYPTION_KEY to be a base64-encoded 32-byte key.
    pub fn from_env() -> Result<Self, EncryptionError> {
        let key_str =
            env::var("PICRELAY_ENCRYPTION_KEY").map_err(|_| EncryptionError::MissingKey)?;

        let key_bytes = general_purpose::STANDARD
            .decode(&key_str)
            .map_err(|e| EncryptionError::Decode(e.to_string()))?;

        Self::from_key_bytes(&key_bytes)
    }

    /// Encrypt a plaintext string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;

        // Combine nonce and ciphertext, then base64 encode
        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(&combined))
    }

    /// Decrypt an encrypted string.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, EncryptionError> {
        let combined = general_purpose::STANDARD
            .decode(encrypted.trim())
            .map_err(|e| EncryptionError::Decode(e.to_string()))?;

        if combined.len() < 12 {
            return Err(EncryptionError::Decrypt(
                "Encrypted data too short".to_string(),
            ));
        }

        // Extract nonce (first 12 bytes) and ciphertext (rest)
        let nonce = Nonce::from_slice(&combined[..12]);
        let ciphertext = &combined[12..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EncryptionError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| EncryptionError::Decrypt(format!("Invalid UTF-8: {}", e)))
    }
}
