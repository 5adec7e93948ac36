//! Directory records and repository.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{QueryBuilder, SqlitePool};

use super::{MAX_BIND_CHUNK, ROOT_DIRECTORY_NAME};
use crate::{Result, VaultError};

const DIRECTORY_COLUMNS: &str =
    "id, user_id, parent_id, name, size, is_deleted, created_at, updated_at";

/// A directory in a user's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Directory {
    /// Unique directory ID.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Parent directory (None only for the root).
    pub parent_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Bytes held by live files anywhere below this directory.
    pub size: i64,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// When the directory was created.
    pub created_at: NaiveDateTime,
    /// When the directory was last modified.
    pub updated_at: NaiveDateTime,
}

impl Directory {
    /// Whether this is the owner's root directory.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Data for creating a new directory.
#[derive(Debug, Clone)]
pub struct NewDirectory {
    /// Owning user.
    pub user_id: i64,
    /// Parent directory (None creates a root).
    pub parent_id: Option<i64>,
    /// Display name.
    pub name: String,
}

impl NewDirectory {
    /// Create a child directory under `parent_id`.
    pub fn new(user_id: i64, parent_id: i64, name: impl Into<String>) -> Self {
        Self {
            user_id,
            parent_id: Some(parent_id),
            name: name.into(),
        }
    }

    /// Create the root directory for `user_id`.
    pub fn root(user_id: i64) -> Self {
        Self {
            user_id,
            parent_id: None,
            name: ROOT_DIRECTORY_NAME.to_string(),
        }
    }
}

/// Builder for updating a directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryUpdate {
    /// New name.
    pub name: Option<String>,
    /// New parent directory.
    pub parent_id: Option<i64>,
    /// New cumulative size.
    pub size: Option<i64>,
}

impl DirectoryUpdate {
    /// Create a new DirectoryUpdate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the parent directory.
    pub fn parent_id(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the size.
    pub fn size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.parent_id.is_none() && self.size.is_none()
    }
}

/// Repository for directory operations.
pub struct DirectoryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DirectoryRepository<'a> {
    /// Create a new DirectoryRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new directory.
    pub async fn create(&self, directory: &NewDirectory) -> Result<Directory> {
        let result = sqlx::query(
            "INSERT INTO directories (user_id, parent_id, name, size) VALUES (?, ?, ?, 0)",
        )
        .bind(directory.user_id)
        .bind(directory.parent_id)
        .bind(&directory.name)
        .execute(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))
    }

    /// Get a directory by ID regardless of owner or deletion state.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Directory>> {
        let directory = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(directory)
    }

    /// Get a live directory owned by `user_id`.
    pub async fn get_owned(&self, id: i64, user_id: i64) -> Result<Option<Directory>> {
        let directory = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories
             WHERE id = ? AND user_id = ? AND is_deleted = 0"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(directory)
    }

    /// Get the live root directory of `user_id`.
    pub async fn get_root(&self, user_id: i64) -> Result<Option<Directory>> {
        let directory = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories
             WHERE user_id = ? AND parent_id IS NULL AND name = ? AND is_deleted = 0"
        ))
        .bind(user_id)
        .bind(ROOT_DIRECTORY_NAME)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(directory)
    }

    /// List live child directories of `parent_id`.
    pub async fn list_children(&self, parent_id: i64) -> Result<Vec<Directory>> {
        let directories = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories
             WHERE parent_id = ? AND is_deleted = 0 ORDER BY name, id"
        ))
        .bind(parent_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(directories)
    }

    /// IDs of live directories whose parent is any of `parent_ids`, owned by `user_id`.
    ///
    /// This is one level of the breadth-first expansion used for subtree walks.
    pub async fn child_ids_of(&self, parent_ids: &[i64], user_id: i64) -> Result<Vec<i64>> {
        let mut ids = Vec::new();

        for chunk in parent_ids.chunks(MAX_BIND_CHUNK) {
            let mut query: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT id FROM directories WHERE is_deleted = 0 AND user_id = ");
            query.push_bind(user_id);
            query.push(" AND parent_id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            query.push(") ORDER BY id");

            let level: Vec<i64> = query
                .build_query_scalar::<i64>()
                .fetch_all(self.pool)
                .await
                .map_err(|e| VaultError::Upstream(e.to_string()))?;
            ids.extend(level);
        }

        Ok(ids)
    }

    /// Update a directory.
    ///
    /// Returns the updated directory, or None if it does not exist.
    pub async fn update(&self, id: i64, update: &DirectoryUpdate) -> Result<Option<Directory>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE directories SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }

        if let Some(parent_id) = update.parent_id {
            separated.push("parent_id = ");
            separated.push_bind_unseparated(parent_id);
        }

        if let Some(size) = update.size {
            separated.push("size = ");
            separated.push_bind_unseparated(size);
        }

        separated.push("updated_at = datetime('now')");

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query
            .build()
            .execute(self.pool)
            .await
            .map_err(|e| VaultError::Upstream(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Persist a recalculated size.
    pub async fn set_size(&self, id: i64, size: i64) -> Result<()> {
        sqlx::query("UPDATE directories SET size = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(size)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(())
    }

    /// Soft-delete a directory.
    pub async fn mark_deleted(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE directories SET is_deleted = 1, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
