//! Directory tree manager.
//!
//! The document store has no recursive queries, so every subtree operation
//! here is an explicit breadth-first worklist over parent links:
//! - descendant enumeration expands one level per query
//! - cascading delete walks a queue, marking directories and their files
//! - size recalculation sums a subtree, then climbs parent links to the root
//!
//! None of these sequences are transactional. A failure part way through
//! leaves sizes stale until the next recalculation over the same chain.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::directory::{Directory, DirectoryRepository, DirectoryUpdate, NewDirectory};
use super::file_record::{FileRecord, FileRepository};
use super::trim_name;
use crate::config::FilesConfig;
use crate::{Result, VaultError};

/// A directory with its direct live children.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    /// The directory itself.
    pub directory: Directory,
    /// Live child directories (not recursive).
    pub directories: Vec<Directory>,
    /// Live files directly inside the directory.
    pub files: Vec<FileRecord>,
}

/// Result of creating a directory.
#[derive(Debug, Clone)]
pub struct CreatedDirectory {
    /// The new directory.
    pub directory: Directory,
    /// Whether the requested name had to be trimmed.
    pub trimmed: bool,
}

/// Requested changes to a directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryChanges {
    /// New name.
    pub name: Option<String>,
    /// New parent directory.
    pub parent_id: Option<i64>,
}

impl DirectoryChanges {
    /// Rename only.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parent_id: None,
        }
    }

    /// Move only.
    pub fn move_to(parent_id: i64) -> Self {
        Self {
            name: None,
            parent_id: Some(parent_id),
        }
    }

    fn is_empty(&self) -> bool {
        self.name.as_deref().map_or(true, |n| n.trim().is_empty()) && self.parent_id.is_none()
    }
}

/// Result of updating a directory.
#[derive(Debug, Clone)]
pub struct UpdatedDirectory {
    /// The directory after the update.
    pub directory: Directory,
    /// Parent before the update; differs from the current parent after a move.
    pub previous_parent_id: Option<i64>,
    /// Whether the requested name had to be trimmed.
    pub trimmed: bool,
}

impl UpdatedDirectory {
    /// Whether the directory changed parent.
    pub fn moved(&self) -> bool {
        self.previous_parent_id != self.directory.parent_id
    }
}

/// Directory tree manager.
pub struct DirectoryTree<'a> {
    pool: &'a SqlitePool,
    config: &'a FilesConfig,
}

impl<'a> DirectoryTree<'a> {
    /// Create a new DirectoryTree.
    pub fn new(pool: &'a SqlitePool, config: &'a FilesConfig) -> Self {
        Self { pool, config }
    }

    fn directories(&self) -> DirectoryRepository<'a> {
        DirectoryRepository::new(self.pool)
    }

    fn files(&self) -> FileRepository<'a> {
        FileRepository::new(self.pool)
    }

    /// Create the root directory for a newly provisioned user.
    ///
    /// Returns the existing root if the user already has one.
    pub async fn provision_root(&self, owner: i64) -> Result<Directory> {
        if let Some(root) = self.directories().get_root(owner).await? {
            return Ok(root);
        }

        let root = self.directories().create(&NewDirectory::root(owner)).await?;
        info!(owner, directory_id = root.id, "Provisioned root directory");
        Ok(root)
    }

    /// Resolve `id` to a live directory of `owner`, defaulting to the root.
    pub async fn resolve(&self, owner: i64, id: Option<i64>) -> Result<Directory> {
        let directory = match id {
            Some(id) => self.directories().get_owned(id, owner).await?,
            None => self.directories().get_root(owner).await?,
        };
        directory.ok_or_else(|| VaultError::NotFound("directory".to_string()))
    }

    /// Create a directory under `parent` (the owner's root when omitted).
    ///
    /// New directories start empty, so no ancestor sizes change.
    pub async fn create_directory(
        &self,
        owner: i64,
        parent: Option<i64>,
        name: &str,
    ) -> Result<CreatedDirectory> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation(
                "directory name is required".to_string(),
            ));
        }

        let parent = self.resolve(owner, parent).await?;
        let (name, trimmed) = trim_name(name, self.config.max_name_length);

        let directory = self
            .directories()
            .create(&NewDirectory::new(owner, parent.id, name))
            .await?;
        debug!(owner, directory_id = directory.id, parent_id = parent.id, "Created directory");

        Ok(CreatedDirectory { directory, trimmed })
    }

    /// Read a directory and its direct live children.
    pub async fn read_directory(&self, id: i64, owner: i64) -> Result<DirectoryListing> {
        let directory = self
            .directories()
            .get_owned(id, owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        self.listing(directory).await
    }

    /// Read the owner's root and its direct live children.
    pub async fn read_root(&self, owner: i64) -> Result<DirectoryListing> {
        let directory = self
            .directories()
            .get_root(owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        self.listing(directory).await
    }

    async fn listing(&self, directory: Directory) -> Result<DirectoryListing> {
        let directories = self.directories().list_children(directory.id).await?;
        let files = self.files().list_in_directory(directory.id).await?;
        Ok(DirectoryListing {
            directory,
            directories,
            files,
        })
    }

    /// Rename and/or move a directory.
    ///
    /// Sizes are not touched; after a move the caller recalculates both the
    /// previous and the new parent chains.
    pub async fn update_directory(
        &self,
        id: i64,
        owner: i64,
        changes: &DirectoryChanges,
    ) -> Result<UpdatedDirectory> {
        if changes.is_empty() {
            return Err(VaultError::InvalidState("no fields to update".to_string()));
        }

        let directory = self
            .directories()
            .get_owned(id, owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        if directory.is_root() {
            return Err(VaultError::InvalidState(
                "cannot update root directory".to_string(),
            ));
        }

        let mut update = DirectoryUpdate::new();
        let mut trimmed = false;

        if let Some(name) = changes.name.as_deref().map(str::trim) {
            if !name.is_empty() {
                let (name, was_trimmed) = trim_name(name, self.config.max_name_length);
                trimmed = was_trimmed;
                update = update.name(name);
            }
        }

        if let Some(parent_id) = changes.parent_id {
            if parent_id == id {
                return Err(VaultError::InvalidState(
                    "directory cannot be its own parent".to_string(),
                ));
            }
            if self.directories().get_owned(parent_id, owner).await?.is_none() {
                return Err(VaultError::NotFound("parent directory".to_string()));
            }
            if self
                .find_all_descendant_ids(id, owner)
                .await?
                .contains(&parent_id)
            {
                return Err(VaultError::InvalidState(
                    "cannot move directory into its own subtree".to_string(),
                ));
            }
            update = update.parent_id(parent_id);
        }

        let updated = self
            .directories()
            .update(id, &update)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;

        Ok(UpdatedDirectory {
            directory: updated,
            previous_parent_id: directory.parent_id,
            trimmed,
        })
    }

    /// Soft-delete a directory, its whole subtree and every file inside it.
    ///
    /// Recalculates sizes from the original parent up to the root. Returns
    /// the directory as it was before deletion.
    pub async fn delete_directory(&self, id: i64, owner: i64) -> Result<Directory> {
        let directory = self
            .directories()
            .get_owned(id, owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        if directory.is_root() {
            return Err(VaultError::InvalidState(
                "cannot delete root directory".to_string(),
            ));
        }

        let mut queue = VecDeque::from([id]);
        let mut visited = HashSet::new();
        let mut directories_marked = 0usize;
        let mut files_marked = 0u64;

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            self.directories().mark_deleted(current).await?;
            files_marked += self.files().mark_deleted_in_directory(current).await?;
            directories_marked += 1;

            for child in self.directories().list_children(current).await? {
                if child.user_id == owner {
                    queue.push_back(child.id);
                }
            }
        }

        self.directories().set_size(id, 0).await?;
        info!(
            owner,
            directory_id = id,
            directories = directories_marked,
            files = files_marked,
            "Deleted directory subtree"
        );

        if let Some(parent_id) = directory.parent_id {
            self.recalculate_size_and_parents(parent_id, owner).await?;
        }

        Ok(directory)
    }

    /// Recompute the size of `id` from its live subtree, then of each ancestor.
    ///
    /// Stops at the root or at the first directory that is missing, deleted
    /// or not owned by `owner`.
    pub async fn recalculate_size_and_parents(&self, id: i64, owner: i64) -> Result<()> {
        let mut current = Some(id);
        let mut seen = HashSet::new();

        while let Some(directory_id) = current {
            if !seen.insert(directory_id) {
                break;
            }

            let Some(directory) = self.directories().get_owned(directory_id, owner).await? else {
                break;
            };

            let size = self.sum_size_by_subtree(directory_id, owner).await?;
            self.directories().set_size(directory_id, size).await?;
            debug!(owner, directory_id, size, "Recalculated directory size");

            current = directory.parent_id;
        }

        Ok(())
    }

    /// Sum the sizes of live files in `id` and every live descendant.
    pub async fn sum_size_by_subtree(&self, id: i64, owner: i64) -> Result<i64> {
        let mut ids = self.find_all_descendant_ids(id, owner).await?;
        ids.push(id);
        self.files().sum_sizes_in(&ids).await
    }

    /// Collect the ids of every live directory below `id`, breadth first.
    ///
    /// `id` itself is not included. Each id is visited once, so the walk
    /// terminates even if stored parent links form a cycle.
    pub async fn find_all_descendant_ids(&self, id: i64, owner: i64) -> Result<Vec<i64>> {
        let mut visited = HashSet::from([id]);
        let mut descendants = Vec::new();
        let mut level = vec![id];

        while !level.is_empty() {
            let children = self.directories().child_ids_of(&level, owner).await?;
            level = children
                .into_iter()
                .filter(|child| visited.insert(*child))
                .collect();
            descendants.extend_from_slice(&level);
        }

        Ok(descendants)
    }

    /// Whether `id` is a live directory owned by `owner`.
    pub async fn check_directory_ownership(&self, id: i64, owner: i64) -> Result<bool> {
        Ok(self.directories().get_owned(id, owner).await?.is_some())
    }
}
