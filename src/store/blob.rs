//! Filesystem blob store.
//!
//! Blobs are addressed by the hex SHA-256 of their bytes and stored in a
//! sharded directory structure:
//! ```text
//! {base_path}/
//! ├── 3a/
//! │   └── 3a7bd3e2360a3d29eea436fcfb7e44c735d117c42d1c1835420b6b9942dd4f1b
//! ├── e3/
//! │   └── e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
//! └── ...
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{BlobReader, BlobStore};
use crate::{Result, VaultError};

/// Content-addressed blob store on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    /// Create a new LocalBlobStore with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Content address of `bytes`.
    pub fn address_of(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Full path of a blob.
    ///
    /// Rejects anything that is not a SHA-256 hex digest so addresses can
    /// never escape the base directory.
    fn blob_path(&self, address: &str) -> Result<PathBuf> {
        if address.len() != 64 || !address.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(VaultError::NotFound(format!("blob {address}")));
        }
        Ok(self.base_path.join(&address[..2]).join(address))
    }
}

/// Write `bytes` to `tmp`, then rename it to `path`.
///
/// The temp file is removed if any step fails.
async fn persist(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let result = async {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(tmp, path).await
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), "Failed to remove temp blob: {}", e);
            }
        }
    }
    result
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let address = Self::address_of(bytes);
        let path = self.blob_path(&address)?;

        if tokio::fs::try_exists(&path).await? {
            debug!(name, address = %address, "Blob already stored");
            return Ok(address);
        }

        let shard = path
            .parent()
            .ok_or_else(|| VaultError::Upstream(format!("invalid blob path for {address}")))?;
        tokio::fs::create_dir_all(shard).await?;

        let tmp = shard.join(format!(".{}.tmp", Uuid::new_v4()));
        persist(&tmp, &path, bytes).await?;

        debug!(name, address = %address, size = bytes.len(), "Stored blob");
        Ok(address)
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(address)?;

        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {address}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, address: &str) -> Result<BlobReader> {
        let path = self.blob_path(address)?;

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {address}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, address: &str) -> Result<String> {
        let path = self.blob_path(address)?;
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };

        Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| VaultError::Upstream(format!("cannot build url for blob {address}")))
    }
}
