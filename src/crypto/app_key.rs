//! Application key and encryption at rest.

use std::fmt;

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

use super::CryptoError;
use crate::config::{SecurityConfig, APP_KEY_LENGTH};

/// AES-256-CTR with big-endian 128-bit counter.
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_LENGTH: usize = 16;

/// Source of the application key.
pub trait AppKeyProvider: Send + Sync {
    /// The 32-byte application key.
    fn app_key(&self) -> Result<[u8; APP_KEY_LENGTH], CryptoError>;
}

/// Application key held in memory.
#[derive(Clone)]
pub struct StaticAppKey {
    key: [u8; APP_KEY_LENGTH],
}

impl StaticAppKey {
    /// Wrap raw key bytes. Fails unless exactly 32 bytes are given.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; APP_KEY_LENGTH] =
            key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: APP_KEY_LENGTH,
                actual: key.len(),
            })?;
        Ok(Self { key })
    }

    /// Use the configured application key.
    pub fn from_config(config: &SecurityConfig) -> Result<Self, CryptoError> {
        Self::new(config.app_key.as_bytes())
    }
}

impl fmt::Debug for StaticAppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAppKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AppKeyProvider for StaticAppKey {
    fn app_key(&self) -> Result<[u8; APP_KEY_LENGTH], CryptoError> {
        Ok(self.key)
    }
}

/// Encrypt a short string with the application key.
///
/// Output is standard base64 of a random 16-byte IV followed by the
/// AES-256-CTR ciphertext.
pub fn encrypt_at_rest(plaintext: &str, key: &[u8; APP_KEY_LENGTH]) -> String {
    let mut iv = [0u8; IV_LENGTH];
    rand::rng().fill_bytes(&mut iv);

    let mut buffer = plaintext.as_bytes().to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), &iv.into());
    cipher.apply_keystream(&mut buffer);

    let mut out = Vec::with_capacity(IV_LENGTH + buffer.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buffer);
    STANDARD.encode(out)
}

/// Reverse [`encrypt_at_rest`].
///
/// The stream mode carries no integrity check; corruption surfaces later as
/// an authentication failure of the content it unlocks.
pub fn decrypt_at_rest(encoded: &str, key: &[u8; APP_KEY_LENGTH]) -> Result<String, CryptoError> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::Decode(e.to_string()))?;
    if raw.len() < IV_LENGTH {
        return Err(CryptoError::Decode("ciphertext too short".to_string()));
    }

    let (iv, ciphertext) = raw.split_at(IV_LENGTH);
    let iv: [u8; IV_LENGTH] = iv
        .try_into()
        .map_err(|_| CryptoError::Decode("invalid iv".to_string()))?;

    let mut buffer = ciphertext.to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), &iv.into());
    cipher.apply_keystream(&mut buffer);

    String::from_utf8(buffer).map_err(|e| CryptoError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_static_key_length() {
        assert!(StaticAppKey::new(KEY).is_ok());
        assert!(matches!(
            StaticAppKey::new(b"short"),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_from_config() {
        let config = SecurityConfig {
            app_key: String::from_utf8(KEY.to_vec()).unwrap(),
            ..SecurityConfig::default()
        };
        let provider = StaticAppKey::from_config(&config).unwrap();
        assert_eq!(&provider.app_key().unwrap(), KEY);
        assert!(StaticAppKey::from_config(&SecurityConfig::default()).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = StaticAppKey::new(KEY).unwrap();
        let debug = format!("{provider:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0123456789abcdef"));
    }

    #[test]
    fn test_at_rest_round_trip() {
        let encrypted = encrypt_at_rest("c2FsdHNhbHRzYWx0", KEY);
        assert_ne!(encrypted, "c2FsdHNhbHRzYWx0");
        assert_eq!(decrypt_at_rest(&encrypted, KEY).unwrap(), "c2FsdHNhbHRzYWx0");
    }

    #[test]
    fn test_at_rest_uses_fresh_iv() {
        let a = encrypt_at_rest("same", KEY);
        let b = encrypt_at_rest("same", KEY);
        assert_ne!(a, b);
    }

    #[test]
    fn test_at_rest_rejects_garbage() {
        assert!(matches!(
            decrypt_at_rest("not base64!!", KEY),
            Err(CryptoError::Decode(_))
        ));
        assert!(matches!(
            decrypt_at_rest(&STANDARD.encode([0u8; 4]), KEY),
            Err(CryptoError::Decode(_))
        ));
    }
}
