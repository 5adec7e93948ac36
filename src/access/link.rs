//! Ephemeral link keys.
//!
//! A key looks like `"{file_id}_{token}"`. The token is an HMAC-SHA256 of 16
//! random bytes under the application key, URL-safe base64 with `-` and `_`
//! removed so the only underscore in a key is the separator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use ring::hmac;

/// Prefix of link keys in the TTL cache.
pub const FILE_KEY_PREFIX: &str = "file_key:";

/// Random bytes fed to the HMAC per key.
const KEY_ENTROPY_BYTES: usize = 16;

/// Generate a fresh link key for `file_id`.
pub fn generate_file_key(file_id: i64, app_key: &[u8]) -> String {
    let mut entropy = [0u8; KEY_ENTROPY_BYTES];
    rand::rng().fill_bytes(&mut entropy);

    let key = hmac::Key::new(hmac::HMAC_SHA256, app_key);
    let tag = hmac::sign(&key, &entropy);
    let token: String = URL_SAFE_NO_PAD
        .encode(tag.as_ref())
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect();

    format!("{file_id}_{token}")
}

/// Cache key under which a link key is stored.
pub fn cache_key(file_key: &str) -> String {
    format!("{FILE_KEY_PREFIX}{file_key}")
}

/// File id embedded in a link key, if it is well formed.
///
/// Only a hint: the cache entry is authoritative.
pub fn file_id_of(file_key: &str) -> Option<i64> {
    let (id, token) = file_key.split_once('_')?;
    if token.is_empty() {
        return None;
    }
    id.parse().ok()
}
