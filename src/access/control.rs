//! Access control subsystem.
//!
//! Sharing changes a file's mode and replaces its grants:
//! - private/public drop every grant
//! - password keeps exactly one hashed-password grant
//! - email keeps one grant per recipient other than the owner
//!
//! Grants for a file are always deleted before new ones are written, so
//! password and email grants never coexist.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::grant::{FileAccessRepository, NewFileAccess};
use super::link::{cache_key, file_id_of, generate_file_key};
use super::mode::AccessMode;
use super::password::{hash_password, validate_password_strength, verify_password};
use crate::config::Config;
use crate::crypto::AppKeyProvider;
use crate::fs::{FileRecord, FileRepository, FileUpdate};
use crate::store::{AccountDirectory, KeyValueCache, Notifier};
use crate::{Result, VaultError};

/// A request to change how a file is shared.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    /// Target mode.
    pub mode: AccessMode,
    /// Share password (password mode).
    pub password: Option<String>,
    /// Recipient emails (email mode).
    pub emails: Vec<String>,
}

impl ShareRequest {
    /// Share with nobody.
    pub fn private() -> Self {
        Self::mode(AccessMode::Private)
    }

    /// Share with anyone holding the file id.
    pub fn public() -> Self {
        Self::mode(AccessMode::Public)
    }

    /// Share with anyone presenting `password`.
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::mode(AccessMode::Password)
        }
    }

    /// Share with the accounts behind `emails`.
    pub fn emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
            ..Self::mode(AccessMode::Email)
        }
    }

    fn mode(mode: AccessMode) -> Self {
        Self {
            mode,
            password: None,
            emails: Vec::new(),
        }
    }
}

/// A freshly issued ephemeral link key.
#[derive(Debug, Clone, Serialize)]
pub struct FileLink {
    /// The key to append to public download requests.
    pub key: String,
    /// Lifetime of the key.
    pub expires_in_secs: u64,
}

/// Access control subsystem.
pub struct AccessControl<'a> {
    pool: &'a SqlitePool,
    config: &'a Config,
    cache: &'a dyn KeyValueCache,
    accounts: &'a dyn AccountDirectory,
    notifier: Arc<dyn Notifier>,
    app_key: &'a dyn AppKeyProvider,
}

impl<'a> AccessControl<'a> {
    /// Create a new AccessControl.
    pub fn new(
        pool: &'a SqlitePool,
        config: &'a Config,
        cache: &'a dyn KeyValueCache,
        accounts: &'a dyn AccountDirectory,
        notifier: Arc<dyn Notifier>,
        app_key: &'a dyn AppKeyProvider,
    ) -> Self {
        Self {
            pool,
            config,
            cache,
            accounts,
            notifier,
            app_key,
        }
    }

    fn grants(&self) -> FileAccessRepository<'a> {
        FileAccessRepository::new(self.pool)
    }

    fn files(&self) -> FileRepository<'a> {
        FileRepository::new(self.pool)
    }

    /// Change the sharing mode of a file owned by `owner`.
    ///
    /// Every input is validated before any existing grant is removed.
    pub async fn share(
        &self,
        owner: i64,
        file_id: i64,
        request: &ShareRequest,
    ) -> Result<FileRecord> {
        if !self.config.files.allows(request.mode) {
            return Err(VaultError::Validation("invalid access type".to_string()));
        }

        self.files()
            .get_owned(file_id, owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        match request.mode {
            AccessMode::Private | AccessMode::Public => {
                self.grants().delete_by_file(file_id).await?;
            }
            AccessMode::Password => {
                let password = request.password.as_deref().unwrap_or_default();
                if password.is_empty() {
                    return Err(VaultError::Validation(
                        "password is required for password-protected access".to_string(),
                    ));
                }
                validate_password_strength(password)?;
                let hash = hash_password(password, &self.config.security)?;

                self.grants().delete_by_file(file_id).await?;
                self.grants()
                    .create(&NewFileAccess::password(file_id, owner, hash))
                    .await?;
            }
            AccessMode::Email => {
                let recipients = self.resolve_recipients(&request.emails).await?;

                self.grants().delete_by_file(file_id).await?;
                for (email, recipient) in recipients {
                    if recipient == owner {
                        continue;
                    }
                    self.grants()
                        .create(&NewFileAccess::recipient(file_id, owner, recipient))
                        .await?;
                    self.notify_detached(email, file_id);
                }
            }
        }

        let file = self
            .files()
            .update(file_id, &FileUpdate::new().access(request.mode))
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        info!(owner, file_id, access = %request.mode, "Updated file access");
        Ok(file)
    }

    /// Resolve every email to an account, failing before anything is changed.
    async fn resolve_recipients(&self, emails: &[String]) -> Result<Vec<(String, i64)>> {
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        for email in emails.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            if !seen.insert(email.to_lowercase()) {
                continue;
            }
            let user_id = self
                .accounts
                .find_user_by_email(email)
                .await?
                .ok_or_else(|| {
                    VaultError::Validation("one or more provided emails are invalid".to_string())
                })?;
            recipients.push((email.to_string(), user_id));
        }

        if recipients.is_empty() {
            return Err(VaultError::Validation(
                "at least one email is required for email access".to_string(),
            ));
        }
        Ok(recipients)
    }

    /// Send a share notification on a detached task.
    fn notify_detached(&self, email: String, file_id: i64) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_file_shared(&email, file_id).await {
                warn!(email = %email, file_id, "Failed to send share notification: {}", e);
            }
        });
    }

    /// Whether `requester` may read `file` as an authenticated user.
    ///
    /// Owners always can; anyone else needs a grant naming them.
    pub async fn validate_file_access(&self, file: &FileRecord, requester: i64) -> Result<bool> {
        if file.user_id == requester {
            return Ok(true);
        }
        self.grants().has_grant(file.id, requester).await
    }

    /// Decide whether an unauthenticated caller may download `file`.
    ///
    /// A live link key issued for this file bypasses the mode check.
    pub async fn authorize_public_download(
        &self,
        file: &FileRecord,
        key: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            match self.resolve_link(key).await? {
                Some(file_id) if file_id == file.id => {
                    debug!(file_id, "Download authorized by link key");
                    return Ok(());
                }
                _ => debug!(file_id = file.id, "Ignoring link key for another or no file"),
            }
        }

        if file.access.is_hidden() {
            return Err(VaultError::NotFound("file".to_string()));
        }
        if file.access == AccessMode::Public {
            return Ok(());
        }

        let password = password.unwrap_or_default();
        if password.is_empty() {
            return Err(VaultError::Validation(
                "password is required for password-protected access".to_string(),
            ));
        }
        let grant = self
            .grants()
            .get_password_grant(file.id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file access".to_string()))?;
        let hash = grant.password.unwrap_or_default();
        verify_password(password, &hash)
            .map_err(|_| VaultError::AccessDenied("invalid password".to_string()))
    }

    /// Issue a link key for a file owned by `owner`.
    ///
    /// `ttl` defaults to the configured lifetime.
    pub async fn issue_link(
        &self,
        owner: i64,
        file_id: i64,
        ttl: Option<Duration>,
    ) -> Result<FileLink> {
        let ttl = ttl.unwrap_or(Duration::from_secs(
            self.config.security.file_key_default_ttl_secs,
        ));
        if ttl.is_zero() {
            return Err(VaultError::Validation(
                "link lifetime must be positive".to_string(),
            ));
        }

        self.files()
            .get_owned(file_id, owner)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        let key = generate_file_key(file_id, &self.app_key.app_key()?);
        self.cache
            .set(&cache_key(&key), &file_id.to_string(), ttl)
            .await?;

        info!(owner, file_id, ttl_secs = ttl.as_secs(), "Issued file link");
        Ok(FileLink {
            key,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// File id a live link key grants access to.
    ///
    /// Malformed keys are rejected without a cache lookup, and the cached id
    /// must match the one embedded in the key.
    pub async fn resolve_link(&self, key: &str) -> Result<Option<i64>> {
        let Some(embedded) = file_id_of(key) else {
            return Ok(None);
        };
        let value = self.cache.get(&cache_key(key)).await?;
        Ok(value
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|file_id| *file_id == embedded))
    }

    /// Recipient user ids of a file's email grants.
    pub async fn recipients(&self, file_id: i64) -> Result<Vec<i64>> {
        let grants = self.grants().list_by_file(file_id).await?;
        Ok(grants.into_iter().filter_map(|g| g.recipient_id).collect())
    }
}
