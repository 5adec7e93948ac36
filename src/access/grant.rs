//! File access grants and repository.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{Result, VaultError};

const GRANT_COLUMNS: &str = "id, file_id, owner_id, recipient_id, password, created_at, updated_at";

/// A sharing grant on a file.
///
/// Password grants carry a hash and no recipient; email grants carry a
/// recipient and no hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FileAccess {
    /// Unique grant ID.
    pub id: i64,
    /// Shared file.
    pub file_id: i64,
    /// Owner of the file at grant time.
    pub owner_id: i64,
    /// Recipient user (email mode).
    pub recipient_id: Option<i64>,
    /// Argon2 hash (password mode).
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// When the grant was created.
    pub created_at: NaiveDateTime,
    /// When the grant was last modified.
    pub updated_at: NaiveDateTime,
}

/// Data for creating a new grant.
#[derive(Debug, Clone)]
pub struct NewFileAccess {
    /// Shared file.
    pub file_id: i64,
    /// Owner of the file.
    pub owner_id: i64,
    /// Recipient user.
    pub recipient_id: Option<i64>,
    /// Password hash.
    pub password: Option<String>,
}

impl NewFileAccess {
    /// A password grant.
    pub fn password(file_id: i64, owner_id: i64, password_hash: impl Into<String>) -> Self {
        Self {
            file_id,
            owner_id,
            recipient_id: None,
            password: Some(password_hash.into()),
        }
    }

    /// An email grant for one recipient.
    pub fn recipient(file_id: i64, owner_id: i64, recipient_id: i64) -> Self {
        Self {
            file_id,
            owner_id,
            recipient_id: Some(recipient_id),
            password: None,
        }
    }
}

/// Repository for file access grants.
pub struct FileAccessRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileAccessRepository<'a> {
    /// Create a new FileAccessRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a grant.
    pub async fn create(&self, grant: &NewFileAccess) -> Result<FileAccess> {
        let result = sqlx::query(
            "INSERT INTO file_access (file_id, owner_id, recipient_id, password)
             VALUES (?, ?, ?, ?)",
        )
        .bind(grant.file_id)
        .bind(grant.owner_id)
        .bind(grant.recipient_id)
        .bind(&grant.password)
        .execute(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file access".to_string()))
    }

    /// Get a grant by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileAccess>> {
        let grant = sqlx::query_as::<_, FileAccess>(&format!(
            "SELECT {GRANT_COLUMNS} FROM file_access WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(grant)
    }

    /// List every grant on a file.
    pub async fn list_by_file(&self, file_id: i64) -> Result<Vec<FileAccess>> {
        let grants = sqlx::query_as::<_, FileAccess>(&format!(
            "SELECT {GRANT_COLUMNS} FROM file_access WHERE file_id = ? ORDER BY id"
        ))
        .bind(file_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(grants)
    }

    /// Get the password grant of a file, if any.
    pub async fn get_password_grant(&self, file_id: i64) -> Result<Option<FileAccess>> {
        let grant = sqlx::query_as::<_, FileAccess>(&format!(
            "SELECT {GRANT_COLUMNS} FROM file_access
             WHERE file_id = ? AND password IS NOT NULL
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(file_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(grant)
    }

    /// Delete every grant on a file.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_by_file(&self, file_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_access WHERE file_id = ?")
            .bind(file_id)
            .execute(self.pool)
            .await
            .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Whether `user_id` appears as owner or recipient on any grant for the file.
    pub async fn has_grant(&self, file_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM file_access
             WHERE file_id = ? AND (owner_id = ? OR recipient_id = ?)",
        )
        .bind(file_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(count > 0)
    }
}
