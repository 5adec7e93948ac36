//! Passphrase envelope encryption.

use std::num::NonZeroU32;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use ring::pbkdf2;
use tracing::debug;

use super::app_key::{decrypt_at_rest, encrypt_at_rest, AppKeyProvider};
use super::CryptoError;

/// Random bytes behind a salt.
pub const SALT_LENGTH: usize = 16;

/// AES-GCM nonce size.
pub const NONCE_LENGTH: usize = 12;

/// Derived key size (AES-256).
pub const KEY_LENGTH: usize = 32;

/// Generate a key derivation salt.
///
/// URL-safe base64 of 16 random bytes with `-` and `_` removed. The
/// encoded string itself is the PBKDF2 salt.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD
        .encode(bytes)
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect()
}

/// Generate an AES-GCM nonce, URL-safe base64 encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode_nonce(encoded: &str) -> Result<[u8; NONCE_LENGTH], CryptoError> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::Decode(e.to_string()))?;
    raw.as_slice().try_into().map_err(|_| {
        CryptoError::Decode(format!(
            "nonce must be {NONCE_LENGTH} bytes, got {}",
            raw.len()
        ))
    })
}

/// Derive a 256-bit key from a passphrase with PBKDF2-HMAC-SHA256.
pub fn derive_key(
    passphrase: &str,
    salt: &str,
    iterations: u32,
) -> Result<[u8; KEY_LENGTH], CryptoError> {
    let iterations = NonZeroU32::new(iterations).ok_or(CryptoError::InvalidIterations)?;
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt.as_bytes(),
        passphrase.as_bytes(),
        &mut key,
    );
    Ok(key)
}

/// Seal `plaintext` with AES-256-GCM. The tag is appended to the ciphertext.
pub fn seal(
    plaintext: &[u8],
    key: &[u8; KEY_LENGTH],
    nonce: &[u8; NONCE_LENGTH],
) -> Result<Vec<u8>, CryptoError> {
    let key: &Key<Aes256Gcm> = key.into();
    let cipher = Aes256Gcm::new(key);
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))
}

/// Open AES-256-GCM `ciphertext` (tag appended).
pub fn open(
    ciphertext: &[u8],
    key: &[u8; KEY_LENGTH],
    nonce: &[u8; NONCE_LENGTH],
) -> Result<Vec<u8>, CryptoError> {
    let key: &Key<Aes256Gcm> = key.into();
    let cipher = Aes256Gcm::new(key);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Output of [`EncryptionPipeline::encrypt_for_upload`].
#[derive(Clone)]
pub struct EncryptedPayload {
    /// Sealed content, ready for the blob store.
    pub ciphertext: Vec<u8>,
    /// Salt, encrypted with the application key.
    pub salt: String,
    /// Nonce, encrypted with the application key.
    pub nonce: String,
}

impl std::fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Encryption pipeline for uploads and downloads.
pub struct EncryptionPipeline<'a> {
    app_key: &'a dyn AppKeyProvider,
    iterations: u32,
}

impl<'a> EncryptionPipeline<'a> {
    /// Create a pipeline using `iterations` rounds of PBKDF2.
    pub fn new(app_key: &'a dyn AppKeyProvider, iterations: u32) -> Self {
        Self {
            app_key,
            iterations,
        }
    }

    /// Seal `plaintext` under `passphrase` and protect the key material.
    pub fn encrypt_for_upload(
        &self,
        plaintext: &[u8],
        passphrase: &str,
    ) -> Result<EncryptedPayload, CryptoError> {
        let app_key = self.app_key.app_key()?;
        let salt = generate_salt();
        let nonce = generate_nonce();

        let key = derive_key(passphrase, &salt, self.iterations)?;
        let ciphertext = seal(plaintext, &key, &decode_nonce(&nonce)?)?;
        debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            "Sealed upload"
        );

        Ok(EncryptedPayload {
            ciphertext,
            salt: encrypt_at_rest(&salt, &app_key),
            nonce: encrypt_at_rest(&nonce, &app_key),
        })
    }

    /// Recover plaintext from stored ciphertext and at-rest key material.
    ///
    /// A wrong passphrase or tampered content yields
    /// [`CryptoError::AuthenticationFailed`].
    pub fn decrypt_for_download(
        &self,
        ciphertext: &[u8],
        encrypted_salt: &str,
        encrypted_nonce: &str,
        passphrase: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let app_key = self.app_key.app_key()?;
        let salt = decrypt_at_rest(encrypted_salt, &app_key)?;
        let nonce = decode_nonce(&decrypt_at_rest(encrypted_nonce, &app_key)?)?;

        let key = derive_key(passphrase, &salt, self.iterations)?;
        open(ciphertext, &key, &nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::StaticAppKey;

    fn provider() -> StaticAppKey {
        StaticAppKey::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn test_salt_and_nonce_format() {
        let salt = generate_salt();
        assert!(!salt.is_empty() && salt.len() <= 22);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));

        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 16);
        assert_eq!(decode_nonce(&nonce).unwrap().len(), NONCE_LENGTH);
        assert!(decode_nonce("AAAA").is_err());
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let a = derive_key("Str0ng!Pass", "salt", 4096).unwrap();
        let b = derive_key("Str0ng!Pass", "salt", 4096).unwrap();
        let c = derive_key("Str0ng!Pass", "other", 4096).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(matches!(
            derive_key("x", "salt", 0),
            Err(CryptoError::InvalidIterations)
        ));
    }

    #[test]
    fn test_seal_appends_tag() {
        let key = [7u8; KEY_LENGTH];
        let nonce = [1u8; NONCE_LENGTH];
        let sealed = seal(b"hello", &key, &nonce).unwrap();
        assert_eq!(sealed.len(), 5 + 16);
        assert_eq!(open(&sealed, &key, &nonce).unwrap(), b"hello");

        let mut tampered = sealed.clone();
        tampered[0] ^= 1;
        assert!(matches!(
            open(&tampered, &key, &nonce),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_pipeline_round_trip() {
        let app_key = provider();
        let pipeline = EncryptionPipeline::new(&app_key, 4096);
        let plaintext = b"quarterly numbers".to_vec();

        let payload = pipeline.encrypt_for_upload(&plaintext, "Str0ng!Pass").unwrap();
        assert_ne!(payload.ciphertext, plaintext);
        assert_eq!(payload.ciphertext.len(), plaintext.len() + 16);

        let decrypted = pipeline
            .decrypt_for_download(&payload.ciphertext, &payload.salt, &payload.nonce, "Str0ng!Pass")
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_passphrase_is_authentication_failure() {
        let app_key = provider();
        let pipeline = EncryptionPipeline::new(&app_key, 4096);

        let payload = pipeline.encrypt_for_upload(b"secret", "Str0ng!Pass").unwrap();
        let result = pipeline.decrypt_for_download(
            &payload.ciphertext,
            &payload.salt,
            &payload.nonce,
            "Wr0ng!Pass",
        );
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_key_material_is_encrypted_at_rest() {
        let app_key = provider();
        let pipeline = EncryptionPipeline::new(&app_key, 4096);
        let payload = pipeline.encrypt_for_upload(b"secret", "Str0ng!Pass").unwrap();

        // Stored salt/nonce are IV-prefixed standard base64, not the raw encodings.
        let raw_nonce = decrypt_at_rest(&payload.nonce, &app_key.app_key().unwrap()).unwrap();
        assert_eq!(raw_nonce.len(), 16);
        assert_ne!(payload.nonce, raw_nonce);

        let other = StaticAppKey::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        let wrong_app_key = EncryptionPipeline::new(&other, 4096);
        assert!(wrong_app_key
            .decrypt_for_download(&payload.ciphertext, &payload.salt, &payload.nonce, "Str0ng!Pass")
            .is_err());
    }
}
