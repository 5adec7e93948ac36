//! Hierarchical filesystem over the flat document store.
//!
//! This module provides:
//! - Directory and file records with their repositories
//! - The directory tree manager (size propagation, cascading delete)
//! - The file record manager (rename/move validation, ownership)
//! - Name trimming and extension helpers shared by both

mod directory;
mod file_record;
mod files;
mod tree;

pub use directory::{Directory, DirectoryRepository, DirectoryUpdate, NewDirectory};
pub use file_record::{FileRecord, FileRepository, FileUpdate, NewFileRecord};
pub use files::{FileChanges, FileManager, UpdatedFile};
pub use tree::{
    CreatedDirectory, DirectoryChanges, DirectoryListing, DirectoryTree, UpdatedDirectory,
};

/// Name of the per-user root directory.
pub const ROOT_DIRECTORY_NAME: &str = "root";

/// Maximum number of ids bound in a single `IN (...)` clause.
pub(crate) const MAX_BIND_CHUNK: usize = 500;

/// Return the extension of `name` including the leading dot, or an empty string.
///
/// Only the final path element is considered and only the last dot counts,
/// so `"archive.tar.gz"` yields `".gz"` and `".env"` yields `".env"`.
pub fn extension(name: &str) -> &str {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[base_start..].rfind('.') {
        Some(dot) => &name[base_start + dot..],
        None => "",
    }
}

/// Whether two names share the same extension, ignoring case.
pub fn same_extension(a: &str, b: &str) -> bool {
    extension(a).to_lowercase() == extension(b).to_lowercase()
}

/// Largest index `<= index` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Trim `name` to at most `max_len` bytes while keeping its extension.
///
/// Returns the (possibly shortened) name and whether trimming happened.
/// When the extension alone is at least `max_len` bytes long the whole name
/// is cut instead.
pub fn trim_name(name: &str, max_len: usize) -> (String, bool) {
    if name.len() <= max_len {
        return (name.to_string(), false);
    }

    let ext = extension(name);
    let base = &name[..name.len() - ext.len()];

    if ext.len() < max_len {
        let keep = floor_char_boundary(base, max_len - ext.len());
        (format!("{}{}", &base[..keep], ext), true)
    } else {
        let keep = floor_char_boundary(name, max_len);
        (name[..keep].to_string(), true)
    }
}
