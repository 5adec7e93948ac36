//! Test helpers for vault scenarios.
//!
//! Builds a vault over an in-memory database and a temporary blob
//! directory, with cheap password hashing.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use filevault::config::Config;
use filevault::{
    Collaborators, Database, FileVault, LocalBlobStore, LogNotifier, MemoryCache, SqliteQuota,
    StaticAccounts, StaticAppKey,
};

/// Application key used by every test vault.
pub const TEST_APP_KEY: &str = "0123456789abcdef0123456789abcdef";

/// A strong share password / passphrase.
pub const STRONG_PASSWORD: &str = "Str0ng!Pass";

/// Owner of most test files.
pub const OWNER: i64 = 1;

/// Email recipient.
pub const BOB: i64 = 2;

/// A user with no grants.
pub const CAROL: i64 = 3;

/// A vault plus handles the scenarios inspect directly.
pub struct TestVault {
    pub vault: FileVault,
    pub quota: Arc<SqliteQuota>,
    _blobs: TempDir,
}

/// Create a test configuration storing blobs under `storage`.
pub fn create_test_config(storage: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = ":memory:".to_string();
    config.storage.path = storage.path().to_string_lossy().into_owned();
    config.security.app_key = TEST_APP_KEY.to_string();
    config.security.hash_memory_kib = 1024;
    config.security.hash_iterations = 1;
    config.logging.file = String::new();
    config
}

/// Create a vault with the owner, bob and carol provisioned.
pub async fn create_test_vault() -> TestVault {
    let storage = TempDir::new().expect("Failed to create blob directory");
    let config = create_test_config(&storage);
    config.validate().expect("Invalid test configuration");

    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");

    let quota = Arc::new(SqliteQuota::new(
        db.pool().clone(),
        config.storage.default_quota_bytes,
    ));
    let accounts = StaticAccounts::new()
        .with_account("owner@example.com", OWNER)
        .with_account("bob@example.com", BOB)
        .with_account("carol@example.com", CAROL);

    let services = Collaborators {
        blobs: Arc::new(
            LocalBlobStore::new(storage.path()).expect("Failed to create blob store"),
        ),
        cache: Arc::new(MemoryCache::new()),
        quota: quota.clone(),
        notifier: Arc::new(LogNotifier),
        accounts: Arc::new(accounts),
        app_key: Arc::new(
            StaticAppKey::new(TEST_APP_KEY.as_bytes()).expect("Invalid test app key"),
        ),
    };

    let vault = FileVault::new(db, config, services);
    for user in [OWNER, BOB, CAROL] {
        vault
            .provision_user(user)
            .await
            .expect("Failed to provision user");
    }

    TestVault {
        vault,
        quota,
        _blobs: storage,
    }
}

/// Deterministic content of `len` bytes.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
