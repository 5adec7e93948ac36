//! SQLite-backed quota ledger.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::{QuotaService, Usage};
use crate::{Result, VaultError};

/// Quota service over the `usage_limits` table.
///
/// Users without a row get `default_limit` and zero usage.
#[derive(Debug, Clone)]
pub struct SqliteQuota {
    pool: SqlitePool,
    default_limit: i64,
}

impl SqliteQuota {
    /// Create a new SqliteQuota.
    pub fn new(pool: SqlitePool, default_limit: i64) -> Self {
        Self {
            pool,
            default_limit,
        }
    }

    /// Set a user's byte limit, creating the ledger row if needed.
    pub async fn set_limit(&self, user_id: i64, limit: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_limits (user_id, bytes_limit) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE
             SET bytes_limit = excluded.bytes_limit, updated_at = datetime('now')",
        )
        .bind(user_id)
        .bind(limit.max(0))
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        debug!(user_id, limit, "Set usage limit");
        Ok(())
    }
}

#[async_trait]
impl QuotaService for SqliteQuota {
    async fn get_usage(&self, user_id: i64) -> Result<Usage> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT bytes_limit, bytes_usage FROM usage_limits WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(match row {
            Some((limit, used)) => Usage { limit, used },
            None => Usage {
                limit: self.default_limit,
                used: 0,
            },
        })
    }

    async fn set_usage(&self, user_id: i64, used: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_limits (user_id, bytes_limit, bytes_usage) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE
             SET bytes_usage = excluded.bytes_usage, updated_at = datetime('now')",
        )
        .bind(user_id)
        .bind(self.default_limit)
        .bind(used.max(0))
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(())
    }
}
