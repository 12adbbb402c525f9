//! In-process durable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

use super::DurableStore;

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

/// A [`DurableStore`] kept in process memory.
///
/// Clones share the same entries, so several contexts in one process can be
/// pointed at one medium. The store can be switched unavailable to model a
/// host that has disabled persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle whether reads and writes are accepted.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(Error::storage_unavailable("memory store disabled"));
        }
        self.inner
            .entries
            .lock()
            .map_err(|_| Error::internal("memory store lock poisoned"))
    }
}

impl DurableStore for MemoryStore {
    fn try_read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn try_write(&self, key: &str, text: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), text.to_string());
        Ok(())
    }

    fn try_remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.write("k", "v");
        assert_eq!(store.read("k").as_deref(), Some("v"));
        assert_eq!(store.len(), 1);

        assert!(store.try_remove("k").unwrap());
        assert!(store.read("k").is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.write("k", "shared");
        assert_eq!(other.read("k").as_deref(), Some("shared"));
    }

    #[test]
    fn test_unavailable_store() {
        let store = MemoryStore::new();
        store.write("k", "before");
        store.set_available(false);

        assert!(store.try_read("k").is_err());
        assert!(store.read("k").is_none());
        store.write("k", "during");

        store.set_available(true);
        assert_eq!(store.read("k").as_deref(), Some("before"));
    }
}
