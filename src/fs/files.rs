//! File record manager.

use sqlx::SqlitePool;
use tracing::debug;

use super::directory::DirectoryRepository;
use super::file_record::{FileRecord, FileRepository, FileUpdate, NewFileRecord};
use super::{same_extension, trim_name};
use crate::config::FilesConfig;
use crate::{Result, VaultError};

/// Requested changes to a file.
#[derive(Debug, Clone, Default)]
pub struct FileChanges {
    /// New name; must keep the current extension.
    pub name: Option<String>,
    /// New containing directory.
    pub directory_id: Option<i64>,
    /// New shared flag.
    pub is_shared: Option<bool>,
}

impl FileChanges {
    /// Rename only.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Move only.
    pub fn move_to(directory_id: i64) -> Self {
        Self {
            directory_id: Some(directory_id),
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.name.as_deref().map_or(true, |n| n.trim().is_empty())
            && self.directory_id.is_none()
            && self.is_shared.is_none()
    }
}

/// Result of updating a file.
#[derive(Debug, Clone)]
pub struct UpdatedFile {
    /// The file after the update.
    pub file: FileRecord,
    /// Directory before the update.
    pub previous_directory_id: i64,
    /// Whether the requested name had to be trimmed.
    pub trimmed: bool,
}

impl UpdatedFile {
    /// Whether the file changed directory.
    pub fn moved(&self) -> bool {
        self.previous_directory_id != self.file.directory_id
    }
}

/// File record manager.
pub struct FileManager<'a> {
    pool: &'a SqlitePool,
    config: &'a FilesConfig,
}

impl<'a> FileManager<'a> {
    /// Create a new FileManager.
    pub fn new(pool: &'a SqlitePool, config: &'a FilesConfig) -> Self {
        Self { pool, config }
    }

    fn files(&self) -> FileRepository<'a> {
        FileRepository::new(self.pool)
    }

    /// Record a file whose bytes are already in the blob store.
    ///
    /// The target directory must be live and owned by the file's owner.
    pub async fn create_file(&self, file: &NewFileRecord) -> Result<FileRecord> {
        if DirectoryRepository::new(self.pool)
            .get_owned(file.directory_id, file.user_id)
            .await?
            .is_none()
        {
            return Err(VaultError::NotFound("directory".to_string()));
        }

        let record = self.files().create(file).await?;
        debug!(
            owner = record.user_id,
            file_id = record.id,
            directory_id = record.directory_id,
            size = record.size,
            "Created file record"
        );
        Ok(record)
    }

    /// Read a live file regardless of owner.
    ///
    /// Only for paths that check sharing grants themselves.
    pub async fn read_file(&self, id: i64) -> Result<FileRecord> {
        self.files()
            .get_live(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))
    }

    /// Read a live file owned by `owner`.
    pub async fn read_owned_file(&self, id: i64, owner: i64) -> Result<FileRecord> {
        self.files()
            .get_owned(id, owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))
    }

    /// Rename, move or flag a file.
    ///
    /// Sizes are not touched; after a move the caller recalculates both the
    /// previous and the new directory chains.
    pub async fn update_file(
        &self,
        id: i64,
        owner: i64,
        changes: &FileChanges,
    ) -> Result<UpdatedFile> {
        if changes.is_empty() {
            return Err(VaultError::InvalidState("no fields to update".to_string()));
        }

        let file = self.read_owned_file(id, owner).await?;
        let mut update = FileUpdate::new();
        let mut trimmed = false;

        if let Some(name) = changes.name.as_deref().map(str::trim) {
            if !name.is_empty() {
                if !same_extension(name, &file.name) {
                    return Err(VaultError::InvalidState(
                        "cannot change file extension".to_string(),
                    ));
                }
                let (name, was_trimmed) = trim_name(name, self.config.max_name_length);
                trimmed = was_trimmed;
                update = update.name(name);
            }
        }

        if let Some(directory_id) = changes.directory_id {
            if DirectoryRepository::new(self.pool)
                .get_owned(directory_id, owner)
                .await?
                .is_none()
            {
                return Err(VaultError::NotFound("directory".to_string()));
            }
            update = update.directory_id(directory_id);
        }

        if let Some(is_shared) = changes.is_shared {
            update = update.is_shared(is_shared);
        }

        let updated = self
            .files()
            .update(id, &update)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        Ok(UpdatedFile {
            file: updated,
            previous_directory_id: file.directory_id,
            trimmed,
        })
    }

    /// Soft-delete a file. Returns the record as it was before deletion.
    pub async fn delete_file(&self, id: i64, owner: i64) -> Result<FileRecord> {
        let file = self.read_owned_file(id, owner).await?;
        self.files().mark_deleted(id).await?;
        debug!(owner, file_id = id, "Deleted file");
        Ok(file)
    }

    /// Whether `id` is a live file owned by `owner`.
    pub async fn check_file_ownership(&self, id: i64, owner: i64) -> Result<bool> {
        Ok(self.files().get_owned(id, owner).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::fs::{DirectoryTree, NewDirectory};

    struct Fixture {
        db: Database,
        config: FilesConfig,
        root: i64,
    }

    async fn setup() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let root = DirectoryRepository::new(db.pool())
            .create(&NewDirectory::root(1))
            .await
            .unwrap()
            .id;
        Fixture {
            db,
            config: FilesConfig::default(),
            root,
        }
    }

    #[tokio::test]
    async fn test_create_requires_owned_directory() {
        let f = setup().await;
        let manager = FileManager::new(f.db.pool(), &f.config);

        let ok = manager
            .create_file(&NewFileRecord::new(1, f.root, "a.txt", "cid", 3))
            .await
            .unwrap();
        assert_eq!(ok.directory_id, f.root);

        let foreign = manager
            .create_file(&NewFileRecord::new(2, f.root, "a.txt", "cid", 3))
            .await;
        assert!(matches!(foreign, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_scoping() {
        let f = setup().await;
        let manager = FileManager::new(f.db.pool(), &f.config);
        let file = manager
            .create_file(&NewFileRecord::new(1, f.root, "a.txt", "cid", 3))
            .await
            .unwrap();

        assert!(manager.read_file(file.id).await.is_ok());
        assert!(manager.read_owned_file(file.id, 1).await.is_ok());
        assert!(matches!(
            manager.read_owned_file(file.id, 2).await,
            Err(VaultError::NotFound(_))
        ));

        manager.delete_file(file.id, 1).await.unwrap();
        assert!(matches!(
            manager.read_file(file.id).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_keeps_extension() {
        let f = setup().await;
        let manager = FileManager::new(f.db.pool(), &f.config);
        let file = manager
            .create_file(&NewFileRecord::new(1, f.root, "report.pdf", "cid", 3))
            .await
            .unwrap();

        let renamed = manager
            .update_file(file.id, 1, &FileChanges::rename("final.PDF"))
            .await
            .unwrap();
        assert_eq!(renamed.file.name, "final.PDF");
        assert!(!renamed.moved());

        for bad in ["final.txt", "final", "final.pdf.exe"] {
            let result = manager
                .update_file(file.id, 1, &FileChanges::rename(bad))
                .await;
            assert!(
                matches!(result, Err(VaultError::InvalidState(ref m)) if m == "cannot change file extension"),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_update_requires_fields() {
        let f = setup().await;
        let manager = FileManager::new(f.db.pool(), &f.config);
        let file = manager
            .create_file(&NewFileRecord::new(1, f.root, "a.txt", "cid", 3))
            .await
            .unwrap();

        assert!(matches!(
            manager.update_file(file.id, 1, &FileChanges::default()).await,
            Err(VaultError::InvalidState(_))
        ));
        assert!(matches!(
            manager.update_file(file.id, 2, &FileChanges::rename("b.txt")).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_between_directories() {
        let f = setup().await;
        let tree = DirectoryTree::new(f.db.pool(), &f.config);
        let manager = FileManager::new(f.db.pool(), &f.config);

        let docs = tree.create_directory(1, None, "docs").await.unwrap().directory;
        let file = manager
            .create_file(&NewFileRecord::new(1, f.root, "a.txt", "cid", 3))
            .await
            .unwrap();

        let moved = manager
            .update_file(file.id, 1, &FileChanges::move_to(docs.id))
            .await
            .unwrap();
        assert!(moved.moved());
        assert_eq!(moved.previous_directory_id, f.root);
        assert_eq!(moved.file.directory_id, docs.id);

        let other_root = tree.provision_root(2).await.unwrap();
        assert!(matches!(
            manager
                .update_file(file.id, 1, &FileChanges::move_to(other_root.id))
                .await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_shared_flag_and_ownership() {
        let f = setup().await;
        let manager = FileManager::new(f.db.pool(), &f.config);
        let file = manager
            .create_file(&NewFileRecord::new(1, f.root, "a.txt", "cid", 3))
            .await
            .unwrap();

        let flagged = manager
            .update_file(
                file.id,
                1,
                &FileChanges {
                    is_shared: Some(true),
                    ..FileChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(flagged.file.is_shared);

        assert!(manager.check_file_ownership(file.id, 1).await.unwrap());
        assert!(!manager.check_file_ownership(file.id, 2).await.unwrap());
        assert!(!manager.check_file_ownership(999, 1).await.unwrap());
    }
}
