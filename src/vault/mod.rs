//! Request-level orchestration.
//!
//! `FileVault` owns the database, configuration and collaborators and runs
//! each flow end to end: validate, mutate, recalculate directory sizes, then
//! sync the owner's usage.

mod manage;
mod transfer;

pub use manage::FileDetails;
pub use transfer::{Download, DownloadBody, DownloadRequest, UploadRequest, UploadedFile};

use std::sync::Arc;

use tracing::info;

use crate::access::AccessControl;
use crate::config::Config;
use crate::crypto::{AppKeyProvider, EncryptionPipeline, StaticAppKey};
use crate::db::Database;
use crate::fs::{Directory, DirectoryTree, FileManager};
use crate::store::{
    AccountDirectory, BlobStore, KeyValueCache, LocalBlobStore, LogNotifier, MemoryCache,
    Notifier, QuotaService, SqliteQuota, StaticAccounts, Usage,
};
use crate::usage::UsageBridge;
use crate::Result;

/// External collaborators used by the vault.
#[derive(Clone)]
pub struct Collaborators {
    /// Content-addressed byte storage.
    pub blobs: Arc<dyn BlobStore>,
    /// TTL cache for link keys.
    pub cache: Arc<dyn KeyValueCache>,
    /// Per-user quota ledger.
    pub quota: Arc<dyn QuotaService>,
    /// Share notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Email to user lookup.
    pub accounts: Arc<dyn AccountDirectory>,
    /// Application key for at-rest encryption and link keys.
    pub app_key: Arc<dyn AppKeyProvider>,
}

impl Collaborators {
    /// Single-node collaborators: filesystem blobs, in-memory cache, SQLite
    /// quota, log-only notifications and the configured accounts.
    pub fn local(db: &Database, config: &Config) -> Result<Self> {
        let accounts = config
            .accounts
            .iter()
            .fold(StaticAccounts::new(), |accounts, (email, user_id)| {
                accounts.with_account(email, *user_id)
            });

        Ok(Self {
            blobs: Arc::new(LocalBlobStore::new(&config.storage.path)?),
            cache: Arc::new(MemoryCache::new()),
            quota: Arc::new(SqliteQuota::new(
                db.pool().clone(),
                config.storage.default_quota_bytes,
            )),
            notifier: Arc::new(LogNotifier),
            accounts: Arc::new(accounts),
            app_key: Arc::new(StaticAppKey::from_config(&config.security)?),
        })
    }
}

/// The file vault service.
pub struct FileVault {
    db: Database,
    config: Config,
    services: Collaborators,
}

impl FileVault {
    /// Create a vault over `db` with the given collaborators.
    pub fn new(db: Database, config: Config, services: Collaborators) -> Self {
        Self {
            db,
            config,
            services,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Create the root directory for a new user. Idempotent.
    pub async fn provision_user(&self, owner: i64) -> Result<Directory> {
        let root = self.tree().provision_root(owner).await?;
        info!(owner, root_id = root.id, "Provisioned user");
        Ok(root)
    }

    /// Current quota and usage of `owner`.
    pub async fn usage_of(&self, owner: i64) -> Result<Usage> {
        self.services.quota.get_usage(owner).await
    }

    fn tree(&self) -> DirectoryTree<'_> {
        DirectoryTree::new(self.db.pool(), &self.config.files)
    }

    fn files(&self) -> FileManager<'_> {
        FileManager::new(self.db.pool(), &self.config.files)
    }

    fn access(&self) -> AccessControl<'_> {
        AccessControl::new(
            self.db.pool(),
            &self.config,
            self.services.cache.as_ref(),
            self.services.accounts.as_ref(),
            Arc::clone(&self.services.notifier),
            self.services.app_key.as_ref(),
        )
    }

    fn usage(&self) -> UsageBridge<'_> {
        UsageBridge::new(self.db.pool(), self.services.quota.as_ref())
    }

    fn pipeline(&self) -> EncryptionPipeline<'_> {
        EncryptionPipeline::new(
            self.services.app_key.as_ref(),
            self.config.security.pbkdf2_iterations,
        )
    }

    /// Recalculate from `directory_id` to the root, then sync usage.
    async fn settle(&self, directory_id: i64, owner: i64) -> Result<()> {
        self.tree()
            .recalculate_size_and_parents(directory_id, owner)
            .await?;
        self.usage().sync(owner).await?;
        Ok(())
    }
}
