//! `campusease` - Persisted, cross-process shared state for campus dashboards
//!
//! This library provides the shared mutable state layer behind the `CampusEase`
//! dashboard: a durable key/value store, a change bus that reaches every
//! context on the machine, reactive shared cells, and the domain store
//! holding requests, announcements and campus events.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod bus;
pub mod cell;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

pub use bus::{Change, ChangeBus, ContextId, RemoteChannel, Subscription};
pub use cell::{LastWriterWins, Reconcile, SharedCell};
pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use models::{
    Announcement, AnnouncementPatch, CampusEvent, CampusEventPatch, Request, RequestPatch,
    RequestStatus,
};
pub use storage::{DurableStore, MemoryStore, Storage, StorageStats};
pub use store::{CampusStore, StoreKeys};
pub use sync::{ChangeWatcher, StorageChannel, WatcherHandle};
