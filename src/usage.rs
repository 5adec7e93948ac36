//! Usage accounting bridge.
//!
//! The quota service is the ledger; directory sizes are a cache over the
//! file records. After every size-affecting mutation the owner's usage is
//! overwritten with the size of their root, so the ledger can never drift
//! by more than one mutation.

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::fs::DirectoryRepository;
use crate::store::{QuotaService, Usage};
use crate::{Result, VaultError};

/// Bridge between the directory tree and the quota service.
pub struct UsageBridge<'a> {
    pool: &'a SqlitePool,
    quota: &'a dyn QuotaService,
}

impl<'a> UsageBridge<'a> {
    /// Create a new UsageBridge.
    pub fn new(pool: &'a SqlitePool, quota: &'a dyn QuotaService) -> Self {
        Self { pool, quota }
    }

    /// Reject an upload of `incoming` bytes that would exceed the owner's limit.
    pub async fn check_quota(&self, owner: i64, incoming: i64) -> Result<Usage> {
        let usage = self.quota.get_usage(owner).await?;
        if usage.used.saturating_add(incoming) > usage.limit {
            warn!(
                owner,
                used = usage.used,
                incoming,
                limit = usage.limit,
                "Upload limit reached"
            );
            return Err(VaultError::QuotaExceeded {
                used: usage.used,
                incoming,
                limit: usage.limit,
            });
        }
        Ok(usage)
    }

    /// Persist the owner's usage as the current size of their root.
    ///
    /// Call after sizes have been recalculated. Returns the stored total.
    pub async fn sync(&self, owner: i64) -> Result<i64> {
        let root = DirectoryRepository::new(self.pool)
            .get_root(owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("root directory".to_string()))?;

        self.quota.set_usage(owner, root.size).await?;
        debug!(owner, used = root.size, "Synced usage");
        Ok(root.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::fs::NewDirectory;
    use crate::store::SqliteQuota;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_check_quota_boundary() {
        let db = setup_db().await;
        let quota = SqliteQuota::new(db.pool().clone(), 100);
        quota.set_usage(1, 60).await.unwrap();
        let bridge = UsageBridge::new(db.pool(), &quota);

        assert!(bridge.check_quota(1, 40).await.is_ok());
        let err = bridge.check_quota(1, 41).await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::QuotaExceeded {
                used: 60,
                incoming: 41,
                limit: 100
            }
        ));
        assert!(err.to_string().starts_with("upload limit reached"));
    }

    #[tokio::test]
    async fn test_sync_uses_root_size() {
        let db = setup_db().await;
        let quota = SqliteQuota::new(db.pool().clone(), 100);
        let dirs = DirectoryRepository::new(db.pool());
        let root = dirs.create(&NewDirectory::root(1)).await.unwrap();
        dirs.set_size(root.id, 42).await.unwrap();

        let bridge = UsageBridge::new(db.pool(), &quota);
        assert_eq!(bridge.sync(1).await.unwrap(), 42);
        assert_eq!(quota.get_usage(1).await.unwrap().used, 42);
    }

    #[tokio::test]
    async fn test_sync_without_root() {
        let db = setup_db().await;
        let quota = SqliteQuota::new(db.pool().clone(), 100);
        let bridge = UsageBridge::new(db.pool(), &quota);

        assert!(matches!(bridge.sync(9).await, Err(VaultError::NotFound(_))));
    }
}
