//! Configuration module for filevault.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::access::AccessMode;
use crate::{Result, VaultError};

/// Minimum PBKDF2 iteration count accepted by `Config::validate`.
pub const MIN_PBKDF2_ITERATIONS: u32 = 4096;

/// Required application key length in bytes (AES-256).
pub const APP_KEY_LENGTH: usize = 32;

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/filevault.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the blob storage directory.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Quota given to users without an explicit limit, in bytes.
    #[serde(default = "default_quota_bytes")]
    pub default_quota_bytes: i64,
}

fn default_storage_path() -> String {
    "data/blobs".to_string()
}

fn default_quota_bytes() -> i64 {
    10 * 1024 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            default_quota_bytes: default_quota_bytes(),
        }
    }
}

/// File handling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Access mode given to newly uploaded files.
    #[serde(default = "default_access")]
    pub default_access: String,
    /// Access modes a share request may select.
    #[serde(default = "default_access_options")]
    pub access_options: Vec<String>,
    /// Largest plaintext accepted for encrypted uploads, in bytes.
    #[serde(default = "default_max_encrypted_size")]
    pub max_encrypted_size_bytes: i64,
    /// Maximum file and directory name length (in bytes).
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Buffer size for streaming downloads, in bytes.
    #[serde(default = "default_stream_buffer_size")]
    pub stream_buffer_size: usize,
}

fn default_access() -> String {
    "private".to_string()
}

fn default_access_options() -> Vec<String> {
    vec![
        "private".to_string(),
        "public".to_string(),
        "password".to_string(),
        "email".to_string(),
    ]
}

fn default_max_encrypted_size() -> i64 {
    20 * 1024 * 1024
}

fn default_max_name_length() -> usize {
    255
}

fn default_stream_buffer_size() -> usize {
    32 * 1024
}

impl FilesConfig {
    /// Parse the configured default access mode.
    pub fn default_access_mode(&self) -> Result<AccessMode> {
        self.default_access.parse().map_err(VaultError::Config)
    }

    /// Check whether a share request may select `mode`.
    pub fn allows(&self, mode: AccessMode) -> bool {
        self.access_options.iter().any(|o| o == mode.as_str())
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            default_access: default_access(),
            access_options: default_access_options(),
            max_encrypted_size_bytes: default_max_encrypted_size(),
            max_name_length: default_max_name_length(),
            stream_buffer_size: default_stream_buffer_size(),
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Application key protecting per-file salts and nonces at rest.
    /// Must be exactly 32 bytes.
    #[serde(default)]
    pub app_key: String,
    /// PBKDF2 iterations for passphrase key derivation.
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
    /// Argon2 memory cost in KiB for share passwords.
    #[serde(default = "default_hash_memory_kib")]
    pub hash_memory_kib: u32,
    /// Argon2 time cost for share passwords.
    #[serde(default = "default_hash_iterations")]
    pub hash_iterations: u32,
    /// Argon2 parallelism for share passwords.
    #[serde(default = "default_hash_parallelism")]
    pub hash_parallelism: u32,
    /// Lifetime of an ephemeral link key when the caller gives none.
    #[serde(default = "default_file_key_ttl")]
    pub file_key_default_ttl_secs: u64,
}

fn default_pbkdf2_iterations() -> u32 {
    MIN_PBKDF2_ITERATIONS
}

fn default_hash_memory_kib() -> u32 {
    19456
}

fn default_hash_iterations() -> u32 {
    2
}

fn default_hash_parallelism() -> u32 {
    1
}

fn default_file_key_ttl() -> u64 {
    3600
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            hash_memory_kib: default_hash_memory_kib(),
            hash_iterations: default_hash_iterations(),
            hash_parallelism: default_hash_parallelism(),
            file_key_default_ttl_secs: default_file_key_ttl(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filevault.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// File handling configuration.
    #[serde(default)]
    pub files: FilesConfig,
    /// Security configuration.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Known accounts, email to user id, for email sharing.
    #[serde(default)]
    pub accounts: HashMap<String, i64>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(VaultError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEVAULT_APP_KEY`: Override the application key
    /// - `FILEVAULT_DATABASE_PATH`: Override the database path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(app_key) = std::env::var("FILEVAULT_APP_KEY") {
            if !app_key.is_empty() {
                self.security.app_key = app_key;
            }
        }
        if let Ok(path) = std::env::var("FILEVAULT_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the application key is not exactly 32 bytes
    /// - the default access mode is unknown or not among the allowed options
    /// - PBKDF2 iterations are below 4096
    pub fn validate(&self) -> Result<()> {
        if self.security.app_key.len() != APP_KEY_LENGTH {
            return Err(VaultError::Config(format!(
                "app_key must be exactly {APP_KEY_LENGTH} bytes. \
                 Set it in config.toml or via FILEVAULT_APP_KEY environment variable."
            )));
        }

        let default_mode = self.files.default_access_mode()?;
        if !self.files.allows(default_mode) {
            return Err(VaultError::Config(format!(
                "default_access '{default_mode}' is not in access_options"
            )));
        }
        for option in &self.files.access_options {
            option.parse::<AccessMode>().map_err(VaultError::Config)?;
        }

        if self.security.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(VaultError::Config(format!(
                "pbkdf2_iterations must be at least {MIN_PBKDF2_ITERATIONS}"
            )));
        }
        if self.storage.default_quota_bytes < 0 {
            return Err(VaultError::Config(
                "default_quota_bytes must not be negative".to_string(),
            ));
        }
        if self.files.stream_buffer_size == 0 {
            return Err(VaultError::Config(
                "stream_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/filevault.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.storage.path, "data/blobs");
        assert_eq!(config.storage.default_quota_bytes, 10 * 1024 * 1024 * 1024);

        assert_eq!(config.files.default_access, "private");
        assert_eq!(config.files.access_options.len(), 4);
        assert_eq!(config.files.max_encrypted_size_bytes, 20 * 1024 * 1024);
        assert_eq!(config.files.max_name_length, 255);
        assert_eq!(config.files.stream_buffer_size, 32 * 1024);

        assert!(config.security.app_key.is_empty());
        assert_eq!(config.security.pbkdf2_iterations, 4096);
        assert_eq!(config.security.file_key_default_ttl_secs, 3600);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/filevault.log");
    }

    #[test]
    fn test_parse_accounts() {
        let config = Config::parse(
            r#"
[accounts]
"bob@example.com" = 2
"carol@example.com" = 3
"#,
        )
        .unwrap();

        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts.get("bob@example.com"), Some(&2));
        assert!(Config::default().accounts.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
path = "custom/vault.sqlite"
max_connections = 8

[storage]
path = "/srv/blobs"
default_quota_bytes = 5000

[files]
default_access = "public"
access_options = ["private", "public"]
max_encrypted_size_bytes = 1048576
max_name_length = 128
stream_buffer_size = 8192

[security]
app_key = "0123456789abcdef0123456789abcdef"
pbkdf2_iterations = 10000
hash_memory_kib = 8192
hash_iterations = 1
hash_parallelism = 1
file_key_default_ttl_secs = 60

[logging]
level = "debug"
file = "/var/log/filevault.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.database.path, "custom/vault.sqlite");
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.storage.path, "/srv/blobs");
        assert_eq!(config.storage.default_quota_bytes, 5000);
        assert_eq!(config.files.default_access, "public");
        assert_eq!(config.files.access_options, vec!["private", "public"]);
        assert_eq!(config.files.max_encrypted_size_bytes, 1048576);
        assert_eq!(config.files.max_name_length, 128);
        assert_eq!(config.files.stream_buffer_size, 8192);
        assert_eq!(config.security.app_key, KEY);
        assert_eq!(config.security.pbkdf2_iterations, 10000);
        assert_eq!(config.security.file_key_default_ttl_secs, 60);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[security]
app_key = "0123456789abcdef0123456789abcdef"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.security.app_key, KEY);
        assert_eq!(config.files.default_access, "private");
        assert_eq!(config.database.path, "data/filevault.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(VaultError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(VaultError::Io(_))));
    }

    #[test]
    fn test_validate_requires_app_key() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_short_app_key() {
        let mut config = Config::default();
        config.security.app_key = "too-short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_default_access() {
        let mut config = Config::default();
        config.security.app_key = KEY.to_string();
        config.files.default_access = "friends".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_default_outside_options() {
        let mut config = Config::default();
        config.security.app_key = KEY.to_string();
        config.files.default_access = "email".to_string();
        config.files.access_options = vec!["private".to_string(), "public".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_low_iterations() {
        let mut config = Config::default();
        config.security.app_key = KEY.to_string();
        config.security.pbkdf2_iterations = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_files_allows() {
        let mut files = FilesConfig::default();
        assert!(files.allows(AccessMode::Email));
        files.access_options = vec!["private".to_string()];
        assert!(!files.allows(AccessMode::Email));
        assert!(files.allows(AccessMode::Private));
    }

    #[test]
    fn test_apply_env_overrides() {
        let original = std::env::var("FILEVAULT_APP_KEY").ok();

        std::env::set_var("FILEVAULT_APP_KEY", "abcdefghijklmnopqrstuvwxyz012345");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.security.app_key, "abcdefghijklmnopqrstuvwxyz012345");

        std::env::set_var("FILEVAULT_APP_KEY", "");
        let mut config = Config::default();
        config.security.app_key = KEY.to_string();
        config.apply_env_overrides();
        assert_eq!(config.security.app_key, KEY);

        if let Some(val) = original {
            std::env::set_var("FILEVAULT_APP_KEY", val);
        } else {
            std::env::remove_var("FILEVAULT_APP_KEY");
        }
    }
}
