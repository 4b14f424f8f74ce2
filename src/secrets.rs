//! Field-level encryption for values persisted by the record store.
//!
//! Client secret and OAuth tokens never hit the database in plaintext. Each
//! value is sealed with ChaCha20-Poly1305 under a single service key and
//! stored as base64(nonce || ciphertext).

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use thiserror::Error as ThisError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, ThisError)]
pub enum SecretError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid encoding")]
    InvalidEncoding,

    #[error("key file must hold {KEY_LEN} bytes")]
    InvalidKeyLength,

    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seals and opens individual record fields under one service key.
#[derive(Clone)]
pub struct SecretBox {
    key: [u8; KEY_LEN],
}

impl SecretBox {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Load the key from `path`, creating a fresh random one (mode 0600)
    /// on first boot.
    pub fn load_or_create(path: &Path) -> Result<Self, SecretError> {
        if path.exists() {
            let encoded = std::fs::read_to_string(path)?;
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|_| SecretError::InvalidEncoding)?;
            let key: [u8; KEY_LEN] =
                bytes.try_into().map_err(|_| SecretError::InvalidKeyLength)?;
            return Ok(Self::new(key));
        }

        let mut key = [0u8; KEY_LEN];
        chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, BASE64.encode(key))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(Self::new(key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let mut nonce_bytes = [0u8; NONCE_LEN];
        chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, SecretError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|_| SecretError::InvalidEncoding)?;
        if combined.len() < NONCE_LEN {
            return Err(SecretError::InvalidEncoding);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SecretError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| SecretError::InvalidEncoding)
    }
}
