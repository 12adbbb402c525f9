//! Cross-context delivery over the shared database.
//!
//! Publishing appends to the `changes` table through [`StorageChannel`].
//! Each context runs a [`ChangeWatcher`] that polls the table for entries
//! written by other contexts and delivers them to its local
//! [`ChangeBus`]. No ordering is promised between contexts beyond the order
//! in which entries reached the log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::bus::{Change, ChangeBus, ContextId, RemoteChannel};
use crate::error::Result;
use crate::storage::Storage;

/// Maximum number of log entries read per poll.
const POLL_BATCH: usize = 256;

/// [`RemoteChannel`] that appends publishes to the shared change log.
#[derive(Debug, Clone)]
pub struct StorageChannel {
    storage: Arc<Storage>,
}

impl StorageChannel {
    /// Create a channel writing to `storage`.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl RemoteChannel for StorageChannel {
    fn broadcast(&self, change: &Change) -> Result<()> {
        self.storage.append_change(change).map(|_| ())
    }
}

/// Polls the change log and feeds other contexts' changes into a bus.
#[derive(Debug)]
pub struct ChangeWatcher {
    storage: Arc<Storage>,
    bus: ChangeBus,
    cursor: i64,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl ChangeWatcher {
    /// Create a watcher that delivers changes logged after this moment.
    ///
    /// # Errors
    ///
    /// Returns an error if the current end of the log cannot be read.
    pub fn new(storage: Arc<Storage>, bus: ChangeBus, poll_interval: Duration) -> Result<Self> {
        let cursor = storage.latest_change_seq()?;
        debug!(cursor, origin = %bus.origin(), "Change watcher created");
        Ok(Self {
            storage,
            bus,
            cursor,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Sequence number of the last log entry seen.
    #[must_use]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// The context whose own publishes are skipped.
    #[must_use]
    pub fn origin(&self) -> ContextId {
        self.bus.origin()
    }

    /// Check if the polling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deliver every change logged by another context since the last poll.
    ///
    /// Entries with an unreadable origin are skipped. Returns the number of
    /// changes delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log cannot be read.
    pub fn poll(&mut self) -> Result<usize> {
        let origin = self.bus.origin();
        let mut delivered = 0;

        loop {
            let batch = self.storage.changes_since(self.cursor, POLL_BATCH)?;
            let exhausted = batch.len() < POLL_BATCH;

            for record in batch {
                self.cursor = record.seq;
                let seq = record.seq;
                match record.into_change() {
                    Ok(change) if change.origin == origin => {
                        trace!(seq, "Skipping own change");
                    }
                    Ok(change) => {
                        self.bus.deliver(&change);
                        delivered += 1;
                    }
                    Err(e) => {
                        debug!(seq, error = %e, "Ignoring malformed change-log entry");
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        if delivered > 0 {
            debug!(delivered, cursor = self.cursor, "Delivered changes from other contexts");
        }
        Ok(delivered)
    }

    /// Poll on an interval until stopped.
    ///
    /// Poll errors are logged and the loop keeps going.
    pub async fn run(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Change watcher already running");
            return;
        }

        debug!(
            interval_ms = self.poll_interval.as_millis(),
            "Starting change watcher"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;

            if let Err(e) = self.poll() {
                warn!(error = %e, "Error polling change log");
            }
        }

        debug!("Change watcher stopped");
    }

    /// Get a handle that can stop the polling loop from another task.
    #[must_use]
    pub fn stop_handle(&self) -> WatcherHandle {
        WatcherHandle {
            running: Arc::clone(&self.running),
        }
    }
}

/// A handle to control a running [`ChangeWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    /// Stop the associated watcher after its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the watcher is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
