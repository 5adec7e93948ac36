//! filevault - multi-tenant file storage backend
//!
//! A hierarchical filesystem over a flat document store, with per-file
//! sharing modes, passphrase envelope encryption and per-user quotas.

pub mod access;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod fs;
pub mod logging;
pub mod store;
pub mod usage;
pub mod vault;

pub use access::{AccessControl, AccessMode, FileAccess, FileLink, ShareRequest};
pub use config::Config;
pub use crypto::{AppKeyProvider, CryptoError, EncryptionPipeline, StaticAppKey};
pub use db::Database;
pub use error::{Result, VaultError};
pub use fs::{
    Directory, DirectoryChanges, DirectoryListing, DirectoryTree, FileChanges, FileManager,
    FileRecord,
};
pub use store::{
    AccountDirectory, BlobStore, KeyValueCache, LocalBlobStore, LogNotifier, MemoryCache,
    Notifier, QuotaService, SqliteQuota, StaticAccounts, Usage,
};
pub use usage::UsageBridge;
pub use vault::{
    Collaborators, Download, DownloadBody, DownloadRequest, FileDetails, FileVault,
    UploadRequest, UploadedFile,
};
