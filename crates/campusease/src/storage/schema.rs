//! `SQLite` schema definitions for campusease.
//!
//! Two tables carry the shared state: `entries` is the durable key/value
//! medium holding one serialized collection per key, and `changes` is the
//! append-only log other processes poll to observe publishes.

/// SQL statement to create the entries table.
pub const CREATE_ENTRIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    digest TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the cross-context change log.
pub const CREATE_CHANGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    origin TEXT NOT NULL,
    published_at TEXT NOT NULL
)
";

/// SQL statement to create an index on the change key.
pub const CREATE_CHANGES_KEY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_changes_key ON changes(key)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ENTRIES_TABLE,
    CREATE_CHANGES_TABLE,
    CREATE_CHANGES_KEY_INDEX,
    CREATE_METADATA_TABLE,
];
