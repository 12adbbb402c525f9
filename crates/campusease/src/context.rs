//! One participant in the shared state.
//!
//! A [`Context`] wires the pieces together for a single process: the
//! database, a bus that forwards publishes to the change log, the domain
//! store, and a watcher that brings in other processes' changes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::bus::{ChangeBus, ContextId, RemoteChannel};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{DurableStore, Storage};
use crate::store::{CampusStore, StoreKeys};
use crate::sync::{ChangeWatcher, StorageChannel};

/// A wired-up participant: storage, bus, store and change watcher.
#[derive(Debug)]
pub struct Context {
    storage: Arc<Storage>,
    bus: ChangeBus,
    store: CampusStore,
    watcher: Option<ChangeWatcher>,
}

impl Context {
    /// Open the database named by `config` and initialize the domain store.
    ///
    /// The change log is pruned to the configured retention first. When
    /// `sync.cross_context` is off, publishes stay inside this process and
    /// no watcher is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(config.database_path())?);
        if let Some(keep) = config.change_log_retention() {
            storage.prune_changes(keep)?;
        }

        let keys = StoreKeys::with_namespace(&config.storage.namespace);
        let context = Self::wire(storage, keys, config.sync.cross_context, config.poll_interval())?;
        info!(
            origin = %context.origin(),
            cross_context = context.bus.is_cross_context(),
            "Context opened"
        );
        Ok(context)
    }

    /// A private context backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let storage = Arc::new(Storage::open_in_memory()?);
        Self::wire(
            storage,
            StoreKeys::default(),
            true,
            Config::default().poll_interval(),
        )
    }

    fn wire(
        storage: Arc<Storage>,
        keys: StoreKeys,
        cross_context: bool,
        poll_interval: Duration,
    ) -> Result<Self> {
        let origin = ContextId::new();
        let bus = if cross_context {
            let channel: Arc<dyn RemoteChannel> =
                Arc::new(StorageChannel::new(Arc::clone(&storage)));
            ChangeBus::new(origin, Some(channel))
        } else {
            ChangeBus::new(origin, None)
        };

        let watcher = if cross_context {
            Some(ChangeWatcher::new(
                Arc::clone(&storage),
                bus.clone(),
                poll_interval,
            )?)
        } else {
            None
        };

        let durable: Arc<dyn DurableStore> = storage.clone();
        let store = CampusStore::new(keys, &durable, &bus);
        debug!(%origin, "Context wired");

        Ok(Self {
            storage,
            bus,
            store,
            watcher,
        })
    }

    /// The domain store.
    #[must_use]
    pub fn store(&self) -> &CampusStore {
        &self.store
    }

    /// The bus this context publishes on.
    #[must_use]
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// The underlying database.
    #[must_use]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// This context's identity.
    #[must_use]
    pub fn origin(&self) -> ContextId {
        self.bus.origin()
    }

    /// The change watcher, if cross-context delivery is enabled.
    pub fn watcher(&mut self) -> Option<&mut ChangeWatcher> {
        self.watcher.as_mut()
    }

    /// Take ownership of the change watcher, e.g. to run it on its own task.
    pub fn take_watcher(&mut self) -> Option<ChangeWatcher> {
        self.watcher.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampusEvent, RequestStatus};

    fn file_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("campusease.db"));
        config
    }

    #[test]
    fn test_in_memory_has_defaults() {
        let context = Context::in_memory().unwrap();
        assert_eq!(context.store().requests().len(), 5);
        assert_eq!(context.store().announcements().len(), 2);
        assert_eq!(context.store().campus_events().len(), 3);
        assert!(context.bus().is_cross_context());
    }

    #[test]
    fn test_open_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir);
        let context = Context::open(&config).unwrap();

        for key in context.store().keys().all() {
            assert!(context.storage().get_entry(key).unwrap().is_some());
        }
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mut config = Config::default();
        config.sync.poll_interval_ms = 0;
        assert!(Context::open(&config).is_err());
    }

    #[test]
    fn test_two_contexts_share_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir);

        let tab_a = Context::open(&config).unwrap();
        let mut tab_b = Context::open(&config).unwrap();
        assert_ne!(tab_a.origin(), tab_b.origin());

        tab_a
            .store()
            .update_request_status("REQ-042", RequestStatus::Approved);

        let delivered = tab_b.watcher().unwrap().poll().unwrap();
        assert_eq!(delivered, 1);

        let requests = tab_b.store().requests();
        let approved = requests.iter().find(|r| r.id == "REQ-042").unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
    }

    #[test]
    fn test_reopen_sees_previous_writes() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir);

        {
            let context = Context::open(&config).unwrap();
            context.store().add_campus_event(CampusEvent {
                id: "evt-99".to_string(),
                title: "Open Day".to_string(),
                date: "2026-04-01".to_string(),
                end: None,
                color: "#10b981".to_string(),
            });
        }

        let reopened = Context::open(&config).unwrap();
        let events = reopened.store().campus_events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].id, "evt-99");
    }

    #[test]
    fn test_local_only_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_config(&dir);
        config.sync.cross_context = false;

        let mut context = Context::open(&config).unwrap();
        assert!(!context.bus().is_cross_context());
        assert!(context.watcher().is_none());

        context.store().remove_campus_event("evt-1");
        assert_eq!(context.storage().latest_change_seq().unwrap(), 0);
    }

    #[test]
    fn test_open_prunes_change_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_config(&dir);
        config.sync.change_log_retention = 1;

        {
            let context = Context::open(&config).unwrap();
            context.store().remove_campus_event("evt-1");
            context.store().remove_campus_event("evt-2");
        }

        let reopened = Context::open(&config).unwrap();
        assert_eq!(reopened.storage().stats().unwrap().change_count, 1);
    }

    #[test]
    fn test_take_watcher() {
        let mut context = Context::in_memory().unwrap();
        assert!(context.take_watcher().is_some());
        assert!(context.take_watcher().is_none());
    }
}
