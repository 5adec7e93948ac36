//! Notification and account lookup for single-node deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use super::{AccountDirectory, Notifier};
use crate::Result;

/// Notifier that records share notifications in the log instead of sending mail.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_file_shared(&self, email: &str, file_id: i64) -> Result<()> {
        info!(email, file_id, "File shared with recipient");
        Ok(())
    }
}

/// Fixed email to user id mapping.
///
/// Stands in for the external account service when the vault runs alone.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    by_email: HashMap<String, i64>,
}

impl StaticAccounts {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account. Emails compare case-insensitively.
    pub fn with_account(mut self, email: &str, user_id: i64) -> Self {
        self.by_email.insert(email.trim().to_lowercase(), user_id);
        self
    }
}

#[async_trait]
impl AccountDirectory for StaticAccounts {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<i64>> {
        Ok(self.by_email.get(&email.trim().to_lowercase()).copied())
    }
}
