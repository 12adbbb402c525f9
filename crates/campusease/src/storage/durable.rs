//! The durable key/value contract used by shared cells.

use std::fmt;

use tracing::warn;

use crate::error::Result;

use super::Storage;

/// A persistence medium holding one serialized value per key.
///
/// Implementors provide the fallible `try_*` methods. Callers that must never
/// fail use [`DurableStore::read`] and [`DurableStore::write`], which log and
/// degrade: a failed read is treated as absent, a failed write is dropped.
pub trait DurableStore: Send + Sync + fmt::Debug {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn try_read(&self, key: &str) -> Result<Option<String>>;

    /// Store `text` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium rejects the write.
    fn try_write(&self, key: &str, text: &str) -> Result<()>;

    /// Remove the value stored under `key`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium rejects the removal.
    fn try_remove(&self, key: &str) -> Result<bool>;

    /// Read the value under `key`, treating any failure as absent.
    fn read(&self, key: &str) -> Option<String> {
        self.try_read(key).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Durable read failed, treating value as absent");
            None
        })
    }

    /// Store `text` under `key` on a best-effort basis.
    fn write(&self, key: &str, text: &str) {
        if let Err(e) = self.try_write(key, text) {
            warn!(key = %key, error = %e, "Durable write failed, value kept in memory only");
        }
    }
}

impl DurableStore for Storage {
    fn try_read(&self, key: &str) -> Result<Option<String>> {
        self.get_entry(key)
    }

    fn try_write(&self, key: &str, text: &str) -> Result<()> {
        self.put_entry(key, text)
    }

    fn try_remove(&self, key: &str) -> Result<bool> {
        self.remove_entry(key)
    }
}
