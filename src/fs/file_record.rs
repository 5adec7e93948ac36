//! File records and repository.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{QueryBuilder, SqlitePool};

use super::MAX_BIND_CHUNK;
use crate::access::AccessMode;
use crate::{Result, VaultError};

const FILE_COLUMNS: &str = "id, user_id, directory_id, name, hash, size, content_type, access, \
     is_shared, is_encrypted, salt, nonce, is_deleted, created_at, updated_at";

/// Metadata for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Containing directory.
    pub directory_id: i64,
    /// Display name (extension is fixed after creation).
    pub name: String,
    /// Content address in the blob store.
    pub hash: String,
    /// Size in bytes.
    pub size: i64,
    /// Declared MIME type.
    pub content_type: String,
    /// Sharing mode.
    #[sqlx(try_from = "String")]
    pub access: AccessMode,
    /// Whether the owner flagged the file as shared.
    pub is_shared: bool,
    /// Whether the blob holds passphrase-encrypted content.
    pub is_encrypted: bool,
    /// Key derivation salt, encrypted with the application key.
    #[serde(skip_serializing)]
    pub salt: Option<String>,
    /// AEAD nonce, encrypted with the application key.
    #[serde(skip_serializing)]
    pub nonce: Option<String>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// When the file was created.
    pub created_at: NaiveDateTime,
    /// When the file was last modified.
    pub updated_at: NaiveDateTime,
}

impl FileRecord {
    /// Extension of the display name, including the dot.
    pub fn extension(&self) -> &str {
        super::extension(&self.name)
    }
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    /// Owning user.
    pub user_id: i64,
    /// Containing directory.
    pub directory_id: i64,
    /// Display name.
    pub name: String,
    /// Content address returned by the blob store.
    pub hash: String,
    /// Size in bytes.
    pub size: i64,
    /// Declared MIME type.
    pub content_type: String,
    /// Initial sharing mode.
    pub access: AccessMode,
    /// Encrypted salt and nonce, when the payload is encrypted.
    pub encryption: Option<(String, String)>,
}

impl NewFileRecord {
    /// Create a new unencrypted, private file record.
    pub fn new(
        user_id: i64,
        directory_id: i64,
        name: impl Into<String>,
        hash: impl Into<String>,
        size: i64,
    ) -> Self {
        Self {
            user_id,
            directory_id,
            name: name.into(),
            hash: hash.into(),
            size,
            content_type: "application/octet-stream".to_string(),
            access: AccessMode::Private,
            encryption: None,
        }
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the initial access mode.
    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Mark the payload as encrypted, storing the at-rest encrypted salt and nonce.
    pub fn with_encryption(mut self, salt: impl Into<String>, nonce: impl Into<String>) -> Self {
        self.encryption = Some((salt.into(), nonce.into()));
        self
    }
}

/// Builder for updating a file record.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    /// New name.
    pub name: Option<String>,
    /// New containing directory.
    pub directory_id: Option<i64>,
    /// New shared flag.
    pub is_shared: Option<bool>,
    /// New access mode.
    pub access: Option<AccessMode>,
}

impl FileUpdate {
    /// Create a new FileUpdate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the containing directory.
    pub fn directory_id(mut self, directory_id: i64) -> Self {
        self.directory_id = Some(directory_id);
        self
    }

    /// Set the shared flag.
    pub fn is_shared(mut self, is_shared: bool) -> Self {
        self.is_shared = Some(is_shared);
        self
    }

    /// Set the access mode.
    pub fn access(mut self, access: AccessMode) -> Self {
        self.access = Some(access);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.directory_id.is_none()
            && self.is_shared.is_none()
            && self.access.is_none()
    }
}

/// Repository for file record operations.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new file record.
    pub async fn create(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let (salt, nonce) = match file.encryption {
            Some((ref salt, ref nonce)) => (Some(salt.as_str()), Some(nonce.as_str())),
            None => (None, None),
        };

        let result = sqlx::query(
            "INSERT INTO files (user_id, directory_id, name, hash, size, content_type, access,
                                is_encrypted, salt, nonce)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.user_id)
        .bind(file.directory_id)
        .bind(&file.name)
        .bind(&file.hash)
        .bind(file.size)
        .bind(&file.content_type)
        .bind(file.access.as_str())
        .bind(file.encryption.is_some())
        .bind(salt)
        .bind(nonce)
        .execute(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))
    }

    /// Get a file by ID regardless of owner or deletion state.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(file)
    }

    /// Get a live file by ID, any owner.
    pub async fn get_live(&self, id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND is_deleted = 0"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(file)
    }

    /// Get a live file owned by `user_id`.
    pub async fn get_owned(&self, id: i64, user_id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND user_id = ? AND is_deleted = 0"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(file)
    }

    /// List live files directly inside `directory_id`.
    pub async fn list_in_directory(&self, directory_id: i64) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE directory_id = ? AND is_deleted = 0 ORDER BY name, id"
        ))
        .bind(directory_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(files)
    }

    /// Sum the sizes of live files inside any of `directory_ids`.
    pub async fn sum_sizes_in(&self, directory_ids: &[i64]) -> Result<i64> {
        let mut total = 0i64;

        for chunk in directory_ids.chunks(MAX_BIND_CHUNK) {
            let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "SELECT COALESCE(SUM(size), 0) FROM files WHERE is_deleted = 0 AND directory_id IN (",
            );
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            query.push(")");

            let sum: i64 = query
                .build_query_scalar::<i64>()
                .fetch_one(self.pool)
                .await
                .map_err(|e| VaultError::Upstream(e.to_string()))?;
            total += sum;
        }

        Ok(total)
    }

    /// Update a file record.
    ///
    /// Returns the updated record, or None if it does not exist.
    pub async fn update(&self, id: i64, update: &FileUpdate) -> Result<Option<FileRecord>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE files SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }

        if let Some(directory_id) = update.directory_id {
            separated.push("directory_id = ");
            separated.push_bind_unseparated(directory_id);
        }

        if let Some(is_shared) = update.is_shared {
            separated.push("is_shared = ");
            separated.push_bind_unseparated(is_shared);
        }

        if let Some(access) = update.access {
            separated.push("access = ");
            separated.push_bind_unseparated(access.as_str());
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

    /// Soft-delete a file.
    pub async fn mark_deleted(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET is_deleted = 1, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete every live file directly inside `directory_id`.
    ///
    /// Returns the number of files marked.
    pub async fn mark_deleted_in_directory(&self, directory_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE files SET is_deleted = 1, updated_at = datetime('now')
             WHERE directory_id = ? AND is_deleted = 0",
        )
        .bind(directory_id)
        .execute(self.pool)
        .await
        .map_err(|e| VaultError::Upstream(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::fs::{DirectoryRepository, NewDirectory};

    async fn setup_db() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let root = DirectoryRepository::new(db.pool())
            .create(&NewDirectory::root(1))
            .await
            .unwrap();
        (db, root.id)
    }

    #[tokio::test]
    async fn test_create_plain_file() {
        let (db, root) = setup_db().await;
        let repo = FileRepository::new(db.pool());

        let file = repo
            .create(&NewFileRecord::new(1, root, "a.txt", "cid-a", 10).with_content_type("text/plain"))
            .await
            .unwrap();

        assert_eq!(file.name, "a.txt");
        assert_eq!(file.hash, "cid-a");
        assert_eq!(file.size, 10);
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(file.access, AccessMode::Private);
        assert!(!file.is_encrypted);
        assert!(file.salt.is_none());
        assert_eq!(file.extension(), ".txt");
    }

    #[tokio::test]
    async fn test_create_encrypted_file() {
        let (db, root) = setup_db().await;
        let repo = FileRepository::new(db.pool());

        let file = repo
            .create(
                &NewFileRecord::new(1, root, "secret.bin", "cid-s", 5)
                    .with_access(AccessMode::Public)
                    .with_encryption("enc-salt", "enc-nonce"),
            )
            .await
            .unwrap();

        assert!(file.is_encrypted);
        assert_eq!(file.salt.as_deref(), Some("enc-salt"));
        assert_eq!(file.nonce.as_deref(), Some("enc-nonce"));
        assert_eq!(file.access, AccessMode::Public);

        // Key material never leaves through serialization.
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("salt").is_none());
        assert!(json.get("nonce").is_none());
    }

    #[tokio::test]
    async fn test_owned_and_live_lookups() {
        let (db, root) = setup_db().await;
        let repo = FileRepository::new(db.pool());

        let file = repo
            .create(&NewFileRecord::new(1, root, "a.txt", "cid", 1))
            .await
            .unwrap();

        assert!(repo.get_owned(file.id, 1).await.unwrap().is_some());
        assert!(repo.get_owned(file.id, 2).await.unwrap().is_none());
        assert!(repo.get_live(file.id).await.unwrap().is_some());

        repo.mark_deleted(file.id).await.unwrap();
        assert!(repo.get_live(file.id).await.unwrap().is_none());
        assert!(repo.get_owned(file.id, 1).await.unwrap().is_none());
        assert!(repo.get_by_id(file.id).await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_sum_sizes_skips_deleted() {
        let (db, root) = setup_db().await;
        let dirs = DirectoryRepository::new(db.pool());
        let repo = FileRepository::new(db.pool());

        let sub = dirs.create(&NewDirectory::new(1, root, "sub")).await.unwrap();
        repo.create(&NewFileRecord::new(1, root, "a", "h", 100))
            .await
            .unwrap();
        repo.create(&NewFileRecord::new(1, sub.id, "b", "h", 20))
            .await
            .unwrap();
        let gone = repo
            .create(&NewFileRecord::new(1, sub.id, "c", "h", 3))
            .await
            .unwrap();
        repo.mark_deleted(gone.id).await.unwrap();

        assert_eq!(repo.sum_sizes_in(&[root]).await.unwrap(), 100);
        assert_eq!(repo.sum_sizes_in(&[sub.id]).await.unwrap(), 20);
        assert_eq!(repo.sum_sizes_in(&[root, sub.id]).await.unwrap(), 120);
        assert_eq!(repo.sum_sizes_in(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_and_mark_deleted_in_directory() {
        let (db, root) = setup_db().await;
        let dirs = DirectoryRepository::new(db.pool());
        let repo = FileRepository::new(db.pool());

        let sub = dirs.create(&NewDirectory::new(1, root, "sub")).await.unwrap();
        let file = repo
            .create(&NewFileRecord::new(1, root, "a.txt", "h", 1))
            .await
            .unwrap();

        let moved = repo
            .update(
                file.id,
                &FileUpdate::new()
                    .name("b.txt")
                    .directory_id(sub.id)
                    .is_shared(true)
                    .access(AccessMode::Email),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.name, "b.txt");
        assert_eq!(moved.directory_id, sub.id);
        assert!(moved.is_shared);
        assert_eq!(moved.access, AccessMode::Email);

        repo.create(&NewFileRecord::new(1, sub.id, "c.txt", "h", 1))
            .await
            .unwrap();
        assert_eq!(repo.mark_deleted_in_directory(sub.id).await.unwrap(), 2);
        assert!(repo.list_in_directory(sub.id).await.unwrap().is_empty());
    }
}
