//! Directory and file management flows.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::FileVault;
use crate::access::{AccessMode, FileLink, ShareRequest};
use crate::fs::{
    CreatedDirectory, Directory, DirectoryChanges, DirectoryListing, FileChanges, FileRecord,
    UpdatedDirectory, UpdatedFile,
};
use crate::Result;

/// A file as seen by its owner.
#[derive(Debug, Clone, Serialize)]
pub struct FileDetails {
    /// The file record.
    pub file: FileRecord,
    /// Recipient user ids, for files shared by email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<i64>>,
    /// Where the stored bytes live.
    pub location: String,
}

impl FileVault {
    /// Create a directory under `parent`, or the owner's root.
    pub async fn create_directory(
        &self,
        owner: i64,
        parent: Option<i64>,
        name: &str,
    ) -> Result<CreatedDirectory> {
        self.tree().create_directory(owner, parent, name).await
    }

    /// List a directory owned by `owner`.
    pub async fn read_directory(&self, owner: i64, id: i64) -> Result<DirectoryListing> {
        self.tree().read_directory(id, owner).await
    }

    /// List the owner's root.
    pub async fn read_root(&self, owner: i64) -> Result<DirectoryListing> {
        self.tree().read_root(owner).await
    }

    /// Rename and/or move a directory, keeping sizes and usage consistent.
    pub async fn update_directory(
        &self,
        owner: i64,
        id: i64,
        changes: &DirectoryChanges,
    ) -> Result<UpdatedDirectory> {
        let updated = self.tree().update_directory(id, owner, changes).await?;
        if updated.moved() {
            if let Some(previous) = updated.previous_parent_id {
                self.settle(previous, owner).await?;
            }
            if let Some(parent) = updated.directory.parent_id {
                self.settle(parent, owner).await?;
            }
        }
        Ok(updated)
    }

    /// Delete a directory with its subtree and release the space.
    pub async fn delete_directory(&self, owner: i64, id: i64) -> Result<Directory> {
        let directory = self.tree().delete_directory(id, owner).await?;
        let used = self.usage().sync(owner).await?;
        info!(owner, directory_id = id, used, "Directory deleted");
        Ok(directory)
    }

    /// Details of a file owned by `owner`.
    pub async fn file_details(&self, owner: i64, file_id: i64) -> Result<FileDetails> {
        let file = self.files().read_owned_file(file_id, owner).await?;
        let recipients = match file.access {
            AccessMode::Email => Some(self.access().recipients(file.id).await?),
            _ => None,
        };
        let location = self.services.blobs.url(&file.hash)?;
        Ok(FileDetails {
            file,
            recipients,
            location,
        })
    }

    /// Rename, move or flag a file, keeping sizes and usage consistent.
    pub async fn update_file(
        &self,
        owner: i64,
        file_id: i64,
        changes: &FileChanges,
    ) -> Result<UpdatedFile> {
        let updated = self.files().update_file(file_id, owner, changes).await?;
        if updated.moved() {
            self.settle(updated.previous_directory_id, owner).await?;
            self.settle(updated.file.directory_id, owner).await?;
        }
        Ok(updated)
    }

    /// Delete a file and release its space. The stored blob is kept.
    pub async fn delete_file(&self, owner: i64, file_id: i64) -> Result<FileRecord> {
        let file = self.files().delete_file(file_id, owner).await?;
        self.settle(file.directory_id, owner).await?;
        info!(owner, file_id, size = file.size, "File deleted");
        Ok(file)
    }

    /// Change how a file is shared.
    pub async fn share(
        &self,
        owner: i64,
        file_id: i64,
        request: &ShareRequest,
    ) -> Result<FileRecord> {
        self.access().share(owner, file_id, request).await
    }

    /// Issue an ephemeral link key for a file.
    pub async fn generate_link(
        &self,
        owner: i64,
        file_id: i64,
        ttl: Option<Duration>,
    ) -> Result<FileLink> {
        self.access().issue_link(owner, file_id, ttl).await
    }
}
