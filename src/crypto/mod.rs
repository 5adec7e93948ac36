//! Encryption for passphrase-protected files.
//!
//! Two layers:
//! - the envelope seals file content with AES-256-GCM under a key derived
//!   from the uploader's passphrase (PBKDF2-HMAC-SHA256)
//! - the per-file salt and nonce are themselves encrypted at rest with the
//!   application key (AES-256-CTR) before they reach the database

mod app_key;
mod envelope;

pub use app_key::{decrypt_at_rest, encrypt_at_rest, AppKeyProvider, StaticAppKey};
pub use envelope::{
    derive_key, generate_nonce, generate_salt, open, seal, EncryptedPayload,
    EncryptionPipeline, KEY_LENGTH, NONCE_LENGTH, SALT_LENGTH,
};

use thiserror::Error;

use crate::VaultError;

/// Cryptographic failures.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A key had the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The iteration count was zero.
    #[error("key derivation iterations must be positive")]
    InvalidIterations,

    /// Stored key material could not be decoded.
    #[error("malformed key material: {0}")]
    Decode(String),

    /// AEAD tag mismatch: wrong passphrase or tampered content.
    #[error("failed to decrypt file")]
    AuthenticationFailed,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailed | CryptoError::Decode(_) => {
                VaultError::AccessDenied(e.to_string())
            }
            CryptoError::InvalidKeyLength { .. } | CryptoError::InvalidIterations => {
                VaultError::Config(e.to_string())
            }
            CryptoError::Encrypt(_) => VaultError::Upstream(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            VaultError::from(CryptoError::AuthenticationFailed),
            VaultError::AccessDenied(ref m) if m == "failed to decrypt file"
        ));
        assert!(matches!(
            VaultError::from(CryptoError::Decode("bad".to_string())),
            VaultError::AccessDenied(_)
        ));
        assert!(matches!(
            VaultError::from(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 3
            }),
            VaultError::Config(_)
        ));
        assert!(matches!(
            VaultError::from(CryptoError::Encrypt("x".to_string())),
            VaultError::Upstream(_)
        ));
    }
}
