//! Access control for shared files.
//!
//! This module provides:
//! - Access modes (private, public, password, email)
//! - Sharing grants and their repository
//! - Share password policy and hashing
//! - Ephemeral link keys
//! - The access control subsystem tying them together

mod control;
mod grant;
mod link;
mod mode;
mod password;

pub use control::{AccessControl, FileLink, ShareRequest};
pub use grant::{FileAccess, FileAccessRepository, NewFileAccess};
pub use link::{cache_key, generate_file_key, FILE_KEY_PREFIX};
pub use mode::AccessMode;
pub use password::{
    hash_password, validate_password_strength, verify_password, PasswordError,
    MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH, SPECIAL_CHARACTERS,
};
