//! Collaborator interfaces and their bundled implementations.
//!
//! The core only talks to the blob store, TTL cache, quota service,
//! notification service and account directory through the traits below.
//! Local implementations are provided for single-node deployments and tests.

mod blob;
mod cache;
mod notify;
mod quota;

pub use blob::LocalBlobStore;
pub use cache::MemoryCache;
pub use notify::{LogNotifier, StaticAccounts};
pub use quota::SqliteQuota;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::Result;

/// Boxed streaming reader returned by [`BlobStore::open`].
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Content-addressed byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return their content address.
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch the bytes at `address`.
    async fn get(&self, address: &str) -> Result<Vec<u8>>;

    /// Open a streaming reader over the bytes at `address`.
    async fn open(&self, address: &str) -> Result<BlobReader>;

    /// A location for `address` that can be handed to clients.
    fn url(&self, address: &str) -> Result<String>;
}

/// Key/value cache with per-entry expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch a live value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`.
    async fn del(&self, key: &str) -> Result<()>;
}

/// A user's quota ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Bytes the user may store.
    pub limit: i64,
    /// Bytes currently stored.
    pub used: i64,
}

/// Per-user byte quota.
#[async_trait]
pub trait QuotaService: Send + Sync {
    /// Current limit and usage.
    async fn get_usage(&self, user_id: i64) -> Result<Usage>;

    /// Persist the user's usage.
    async fn set_usage(&self, user_id: i64, used: i64) -> Result<()>;
}

/// Outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell `email` that a file was shared with them.
    async fn notify_file_shared(&self, email: &str, file_id: i64) -> Result<()>;
}

/// Lookup of user accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolve an email address to a user id.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<i64>>;
}
