//! Persisted, bus-synchronised shared variables.
//!
//! A [`SharedCell`] owns the in-memory value for one storage key. Writes go
//! to memory first, then to the [`DurableStore`], then out on the
//! [`ChangeBus`]. Changes arriving on the bus for the same key are merged in
//! through a [`Reconcile`] strategy, which defaults to [`LastWriterWins`].
//!
//! None of the operations here fail. Serialization problems and storage
//! outages are logged and the in-memory value stays authoritative for this
//! context.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::bus::{Change, ChangeBus, Subscription};
use crate::storage::DurableStore;

/// Strategy for combining the local value with one received from the bus.
pub trait Reconcile<T>: Send + Sync + fmt::Debug {
    /// Produce the value to keep after `remote` arrives while `local` is current.
    fn reconcile(&self, local: &T, remote: T) -> T;
}

/// The incoming value replaces the local one, whatever it was.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastWriterWins;

impl<T> Reconcile<T> for LastWriterWins {
    fn reconcile(&self, _local: &T, remote: T) -> T {
        remote
    }
}

struct CellInner<T> {
    key: String,
    store: Arc<dyn DurableStore>,
    bus: ChangeBus,
    value: watch::Sender<Arc<T>>,
    reconciler: Arc<dyn Reconcile<T>>,
    /// Held from reading the current value until the next one is stored.
    writes: Mutex<()>,
}

impl<T> CellInner<T>
where
    T: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
{
    fn current(&self) -> Arc<T> {
        Arc::clone(&self.value.borrow())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in `next`, waking watchers only if it differs.
    fn replace(&self, next: Arc<T>) {
        self.value.send_if_modified(|slot| {
            if **slot == *next {
                false
            } else {
                *slot = next;
                true
            }
        });
    }

    fn apply(&self, change: &Change) {
        if change.key != self.key {
            return;
        }

        let remote: T = match serde_json::from_str(&change.value) {
            Ok(value) => value,
            Err(e) => {
                debug!(
                    key = %self.key,
                    origin = %change.origin,
                    error = %e,
                    "Ignoring malformed change"
                );
                return;
            }
        };

        let _guard = self.lock_writes();
        let merged = self.reconciler.reconcile(&self.current(), remote);
        self.replace(Arc::new(merged));
        trace!(key = %self.key, origin = %change.origin, "Applied change");
    }
}

/// A shared, persisted value bound to one storage key.
///
/// Dropping the cell unsubscribes it from the bus; the persisted value stays.
pub struct SharedCell<T> {
    inner: Arc<CellInner<T>>,
    subscription: Subscription,
}

impl<T> SharedCell<T>
where
    T: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
{
    /// Bind a cell to `key` with last-writer-wins reconciliation.
    ///
    /// The initial value is read from `store`. If nothing is stored, or what
    /// is stored does not deserialize, `default` is installed and persisted.
    pub fn initialize(
        key: impl Into<String>,
        default: T,
        store: Arc<dyn DurableStore>,
        bus: ChangeBus,
    ) -> Self {
        Self::initialize_with_reconciler(key, default, store, bus, Arc::new(LastWriterWins))
    }

    /// Bind a cell to `key` with a custom reconciliation strategy.
    pub fn initialize_with_reconciler(
        key: impl Into<String>,
        default: T,
        store: Arc<dyn DurableStore>,
        bus: ChangeBus,
        reconciler: Arc<dyn Reconcile<T>>,
    ) -> Self {
        let key = key.into();
        let initial = load_or_install(&*store, &key, default);
        let (value, _) = watch::channel(Arc::new(initial));

        let inner = Arc::new(CellInner {
            key,
            store,
            bus,
            value,
            reconciler,
            writes: Mutex::new(()),
        });

        let weak: Weak<CellInner<T>> = Arc::downgrade(&inner);
        let subscription = inner.bus.subscribe(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(change);
            }
        });

        Self {
            inner,
            subscription,
        }
    }

    /// The storage key this cell is bound to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The current in-memory value.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        self.inner.current()
    }

    /// Replace the value.
    ///
    /// Returns the value now current in this context.
    pub fn set(&self, value: T) -> Arc<T> {
        self.update(move |_| value)
    }

    /// Compute the next value from the current one.
    ///
    /// The in-memory value is updated before this returns, even if the value
    /// cannot be persisted or published. Concurrent updates on the same cell
    /// run one after another, so none is lost. `updater` must not write to
    /// this cell.
    pub fn update<F>(&self, updater: F) -> Arc<T>
    where
        F: FnOnce(&T) -> T,
    {
        let (next, text) = {
            let _guard = self.inner.lock_writes();
            let next = Arc::new(updater(&self.inner.current()));
            self.inner.replace(Arc::clone(&next));

            let text = match serde_json::to_string(&*next) {
                Ok(text) => {
                    self.inner.store.write(&self.inner.key, &text);
                    Some(text)
                }
                Err(e) => {
                    warn!(
                        key = %self.inner.key,
                        error = %e,
                        "Failed to serialize value, change kept in memory only"
                    );
                    None
                }
            };
            (next, text)
        };

        // This cell already holds the value; only other subscribers need it
        if let Some(text) = text {
            self.inner
                .bus
                .publish_from(&self.subscription, &self.inner.key, &text);
        }

        next
    }

    /// A receiver that is signalled whenever the value changes.
    ///
    /// This is the re-render hook for views: await `changed()` and read the
    /// latest value with `borrow_and_update()`.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<T>> {
        self.inner.value.subscribe()
    }
}

impl<T> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCell")
            .field("key", &self.inner.key)
            .field("reconciler", &self.inner.reconciler)
            .finish_non_exhaustive()
    }
}

fn load_or_install<T>(store: &dyn DurableStore, key: &str, default: T) -> T
where
    T: Serialize + DeserializeOwned,
{
    if let Some(text) = store.read(key) {
        match serde_json::from_str(&text) {
            Ok(value) => {
                debug!(key = %key, "Loaded persisted value");
                return value;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Persisted value is malformed, installing default");
            }
        }
    } else {
        debug!(key = %key, "No persisted value, installing default");
    }

    match serde_json::to_string(&default) {
        Ok(text) => store.write(key, &text),
        Err(e) => warn!(key = %key, error = %e, "Failed to serialize default value"),
    }
    default
}
