//! Storage layer for campusease.
//!
//! This module provides the durable key/value medium shared by every context
//! on the machine. [`Storage`] is the `SQLite` backend: it holds one
//! serialized collection per key and the append-only change log that carries
//! publishes between processes. [`DurableStore`] is the narrow read/write
//! contract the shared cells depend on, implemented by [`Storage`] and by the
//! in-process [`MemoryStore`].

mod durable;
mod memory;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::bus::{Change, ContextId};
use crate::error::{Error, Result};

pub use durable::DurableStore;
pub use memory::MemoryStore;

/// How long a connection waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Compute the BLAKE3 fingerprint of a serialized value.
#[must_use]
pub fn digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// `SQLite`-backed durable store and change log.
///
/// Several processes may open the same database file; each write is a
/// single statement, so the last write to reach the file wins.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets readers in other processes proceed while one process writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("storage connection lock poisoned"))
    }

    /// Read the serialized value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_entry(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Replace the serialized value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put_entry(&self, key: &str, value: &str) -> Result<()> {
        let digest = digest(value);
        let updated_at = Utc::now().to_rfc3339();

        self.conn()?.execute(
            r"
            INSERT INTO entries (key, value, digest, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                digest = excluded.digest,
                updated_at = excluded.updated_at
            ",
            params![key, value, digest, updated_at],
        )?;

        debug!(key = %key, digest = %&digest[..16], "Stored entry");
        Ok(())
    }

    /// Delete the value stored under `key`.
    ///
    /// Returns `true` if an entry was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_entry(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM entries WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    /// Summaries of every stored entry, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn entries(&self) -> Result<Vec<EntrySummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, digest, length(value), updated_at FROM entries ORDER BY key",
        )?;

        let entries = stmt
            .query_map([], |row| {
                let len: i64 = row.get(2)?;
                let updated_at: String = row.get(3)?;
                Ok(EntrySummary {
                    key: row.get(0)?,
                    digest: row.get(1)?,
                    len: usize::try_from(len).unwrap_or(0),
                    updated_at: parse_timestamp(&updated_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Append a change to the cross-context log.
    ///
    /// Returns the sequence number assigned to the entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn append_change(&self, change: &Change) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO changes (key, value, origin, published_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                change.key,
                change.value,
                change.origin.to_string(),
                change.published_at.to_rfc3339(),
            ],
        )?;

        let seq = conn.last_insert_rowid();
        debug!(seq, key = %change.key, "Appended change");
        Ok(seq)
    }

    /// Fetch up to `limit` changes with a sequence number greater than `after`,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn changes_since(&self, after: i64, limit: usize) -> Result<Vec<ChangeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT seq, key, value, origin, published_at
            FROM changes WHERE seq > ?1
            ORDER BY seq ASC LIMIT ?2
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![after, limit_i64], |row| {
                Ok(ChangeRecord {
                    seq: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    origin: row.get(3)?,
                    published_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Highest sequence number in the change log, or 0 if it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_change_seq(&self) -> Result<i64> {
        let seq: Option<i64> =
            self.conn()?
                .query_row("SELECT MAX(seq) FROM changes", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0))
    }

    /// Prune the change log to keep only the most recent `keep` entries.
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_changes(&self, keep: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep).unwrap_or(i64::MAX);
        let affected = self.conn()?.execute(
            r"
            DELETE FROM changes WHERE seq NOT IN (
                SELECT seq FROM changes ORDER BY seq DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            info!("Pruned {} change-log entries to keep {} recent", affected, keep);
        }
        Ok(affected)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (entry_count, change_count, newest): (i64, i64, Option<String>) = {
            let conn = self.conn()?;
            let entry_count = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            let change_count =
                conn.query_row("SELECT COUNT(*) FROM changes", [], |row| row.get(0))?;
            let newest = conn
                .query_row(
                    "SELECT published_at FROM changes ORDER BY seq DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            (entry_count, change_count, newest)
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            entry_count,
            change_count,
            latest_change_seq: self.latest_change_seq()?,
            newest_change: newest.map(|s| parse_timestamp(&s)),
            db_size_bytes,
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// A raw change-log row as read back from the database.
///
/// Rows are written by other processes, so the origin and timestamp are
/// validated only when converted with [`ChangeRecord::into_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Position in the log.
    pub seq: i64,
    /// Storage key the change applies to.
    pub key: String,
    /// The serialized value.
    pub value: String,
    /// Publishing context, as stored.
    pub origin: String,
    /// Publication time, as stored.
    pub published_at: String,
}

impl ChangeRecord {
    /// Convert into a [`Change`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownContext`] if the origin is not a context id.
    pub fn into_change(self) -> Result<Change> {
        let origin: ContextId = self.origin.parse()?;
        Ok(Change {
            key: self.key,
            value: self.value,
            origin,
            published_at: parse_timestamp(&self.published_at),
        })
    }
}

/// Summary of one stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    /// Storage key.
    pub key: String,
    /// BLAKE3 fingerprint of the stored value.
    pub digest: String,
    /// Length of the stored value in bytes.
    pub len: usize,
    /// When the entry was last written.
    pub updated_at: DateTime<Utc>,
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of stored entries.
    pub entry_count: i64,
    /// Number of change-log entries retained.
    pub change_count: i64,
    /// Highest change-log sequence number.
    pub latest_change_seq: i64,
    /// When the most recent change was published.
    pub newest_change: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
