//! File access modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a file may be reached by anyone other than its owner.
///
/// Modes change only through an explicit share operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Owner and explicit grant holders only.
    #[default]
    Private,
    /// Anyone with the file id.
    Public,
    /// Anyone presenting the share password.
    Password,
    /// Listed recipients only.
    Email,
}

impl AccessMode {
    /// Convert to the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Private => "private",
            AccessMode::Public => "public",
            AccessMode::Password => "password",
            AccessMode::Email => "email",
        }
    }

    /// Whether unauthenticated callers are refused without revealing the file.
    pub fn is_hidden(&self) -> bool {
        matches!(self, AccessMode::Private | AccessMode::Email)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(AccessMode::Private),
            "public" => Ok(AccessMode::Public),
            "password" => Ok(AccessMode::Password),
            "email" => Ok(AccessMode::Email),
            _ => Err(format!("unknown access mode: {s}")),
        }
    }
}

impl TryFrom<String> for AccessMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
