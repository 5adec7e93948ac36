//! Database schema and migrations for filevault.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Directory tree
    r#"
CREATE TABLE directories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    parent_id   INTEGER REFERENCES directories(id),  -- NULL only for the root
    name        TEXT NOT NULL,
    size        INTEGER NOT NULL DEFAULT 0,          -- live subtree bytes
    is_deleted  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_directories_user_parent ON directories(user_id, parent_id);
CREATE INDEX idx_directories_parent ON directories(parent_id, is_deleted);
CREATE UNIQUE INDEX idx_directories_single_root
    ON directories(user_id) WHERE parent_id IS NULL AND is_deleted = 0;
"#,
    // v2: File records
    r#"
CREATE TABLE files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    directory_id  INTEGER NOT NULL REFERENCES directories(id),
    name          TEXT NOT NULL,
    hash          TEXT NOT NULL,                     -- blob content address
    size          INTEGER NOT NULL DEFAULT 0,
    content_type  TEXT NOT NULL DEFAULT 'application/octet-stream',
    access        TEXT NOT NULL DEFAULT 'private',   -- private, public, password, email
    is_shared     INTEGER NOT NULL DEFAULT 0,
    is_encrypted  INTEGER NOT NULL DEFAULT 0,
    salt          TEXT,                              -- encrypted with the app key
    nonce         TEXT,                              -- encrypted with the app key
    is_deleted    INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_files_directory ON files(directory_id, is_deleted);
CREATE INDEX idx_files_user ON files(user_id);
"#,
    // v3: Sharing grants
    r#"
CREATE TABLE file_access (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id       INTEGER NOT NULL REFERENCES files(id),
    owner_id      INTEGER NOT NULL,
    recipient_id  INTEGER,                           -- email mode only
    password      TEXT,                              -- password mode only, Argon2 hash
    created_at    TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_file_access_file ON file_access(file_id);
CREATE INDEX idx_file_access_recipient ON file_access(recipient_id);
"#,
    // v4: Per-user quota ledger
    r#"
CREATE TABLE usage_limits (
    user_id      INTEGER PRIMARY KEY,
    bytes_limit  INTEGER NOT NULL,
    bytes_usage  INTEGER NOT NULL DEFAULT 0,
    updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
];
