//! Share password policy and hashing.
//!
//! Uses Argon2id with the cost taken from `SecurityConfig`.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand_core::OsRng;
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::VaultError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Characters accepted as the required special character.
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*";

/// Password-related errors.
#[derive(Error, Debug)]
pub enum PasswordError {
    /// Password is too short.
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    TooShort,

    /// Password is too long.
    #[error("password must be at most {MAX_PASSWORD_LENGTH} characters")]
    TooLong,

    /// A required character class is absent.
    #[error("password must contain at least one {0}")]
    MissingCharacter(&'static str),

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    HashError(String),

    /// Password hash is invalid.
    #[error("invalid password hash format")]
    InvalidHash,

    /// Password verification failed (wrong password).
    #[error("password verification failed")]
    VerificationFailed,
}

impl From<PasswordError> for VaultError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::TooShort
            | PasswordError::TooLong
            | PasswordError::MissingCharacter(_) => VaultError::Validation(e.to_string()),
            PasswordError::VerificationFailed => {
                VaultError::AccessDenied("invalid password".to_string())
            }
            PasswordError::HashError(_) | PasswordError::InvalidHash => {
                VaultError::Upstream(e.to_string())
            }
        }
    }
}

fn create_argon2(config: &SecurityConfig) -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(
        config.hash_memory_kib,
        config.hash_iterations,
        config.hash_parallelism,
        None,
    )
    .map_err(|e| PasswordError::HashError(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Check a password against the strength policy.
///
/// Requires 8 to 128 characters with at least one uppercase letter, one
/// lowercase letter, one digit and one of `!@#$%^&*`.
///
/// # Examples
///
/// ```
/// use filevault::access::validate_password_strength;
///
/// assert!(validate_password_strength("Str0ng!Pass").is_ok());
/// assert!(validate_password_strength("weakpass").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooLong);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordError::MissingCharacter("uppercase letter"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordError::MissingCharacter("lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::MissingCharacter("digit"));
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        return Err(PasswordError::MissingCharacter("special character"));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// Returns a PHC-formatted hash string that includes the salt and parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = create_argon2(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// The cost parameters are read from the stored hash, so hashes made under
/// an older configuration keep verifying.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}
