//! Error types for filevault.

use thiserror::Error;

/// Common error type for filevault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Resource not found.
    ///
    /// Owner-scoped reads use this for missing, deleted and foreign records
    /// alike, so callers cannot discover the existence of other users' data.
    #[error("{0} not found")]
    NotFound(String),

    /// The requested mutation is not allowed in the current state
    /// (root mutation, extension change, cyclic reparent, empty update).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Access denied (password mismatch, decryption failure, missing grant).
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The owner's storage quota would be exceeded.
    #[error("upload limit reached: {used} + {incoming} exceeds {limit} bytes")]
    QuotaExceeded {
        /// Bytes currently used.
        used: i64,
        /// Bytes being added.
        incoming: i64,
        /// Quota ceiling.
        limit: i64,
    },

    /// A collaborator (document store, blob store, cache) failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Upstream(e.to_string())
    }
}

/// Result type alias for filevault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_display() {
        let err = VaultError::NotFound("directory".to_string());
        assert_eq!(err.to_string(), "directory not found");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = VaultError::InvalidState("cannot update root directory".to_string());
        assert_eq!(err.to_string(), "invalid state: cannot update root directory");
    }

    #[test]
    fn test_access_denied_display() {
        let err = VaultError::AccessDenied("invalid password".to_string());
        assert_eq!(err.to_string(), "access denied: invalid password");
    }

    #[test]
    fn test_quota_exceeded_display() {
        let err = VaultError::QuotaExceeded {
            used: 90,
            incoming: 20,
            limit: 100,
        };
        assert_eq!(
            err.to_string(),
            "upload limit reached: 90 + 20 exceeds 100 bytes"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "blob missing");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io(_)));
        assert!(err.to_string().contains("blob missing"));
    }

    #[test]
    fn test_sqlx_error_is_upstream() {
        let err: VaultError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, VaultError::Upstream(_)));
    }
}
