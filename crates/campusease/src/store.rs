//! The campus domain store.
//!
//! [`CampusStore`] owns the three shared collections and the typed mutations
//! views are allowed to perform on them. Every mutation rewrites the whole
//! collection through its [`SharedCell`], so persistence and cross-context
//! delivery come for free. Mutations never fail; an id that is not present
//! leaves the collection untouched and nothing is written.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::bus::ChangeBus;
use crate::cell::SharedCell;
use crate::models::{
    default_announcements, default_campus_events, default_requests, Announcement,
    AnnouncementPatch, CampusEvent, CampusEventPatch, Record, Request, RequestPatch,
    RequestStatus,
};
use crate::storage::DurableStore;

/// The persisted keys for the three collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    /// Key for the requests collection.
    pub requests: String,
    /// Key for the announcements collection.
    pub announcements: String,
    /// Key for the calendar events collection.
    pub events: String,
}

impl StoreKeys {
    /// Keys under `namespace`, e.g. `campusease_requests`.
    #[must_use]
    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            requests: format!("{namespace}_requests"),
            announcements: format!("{namespace}_announcements"),
            events: format!("{namespace}_events"),
        }
    }

    /// All keys, in a fixed order.
    #[must_use]
    pub fn all(&self) -> [&str; 3] {
        [&self.requests, &self.announcements, &self.events]
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::with_namespace("campusease")
    }
}

/// Shared requests, announcements and calendar events.
#[derive(Debug)]
pub struct CampusStore {
    keys: StoreKeys,
    requests: SharedCell<Vec<Request>>,
    announcements: SharedCell<Vec<Announcement>>,
    events: SharedCell<Vec<CampusEvent>>,
}

impl CampusStore {
    /// Bind the three collections to `store` and `bus`, installing the
    /// default snapshots for any that are not persisted yet.
    pub fn new(keys: StoreKeys, store: &Arc<dyn DurableStore>, bus: &ChangeBus) -> Self {
        let requests = SharedCell::initialize(
            keys.requests.clone(),
            default_requests(),
            Arc::clone(store),
            bus.clone(),
        );
        let announcements = SharedCell::initialize(
            keys.announcements.clone(),
            default_announcements(),
            Arc::clone(store),
            bus.clone(),
        );
        let events = SharedCell::initialize(
            keys.events.clone(),
            default_campus_events(),
            Arc::clone(store),
            bus.clone(),
        );

        info!(
            requests = requests.get().len(),
            announcements = announcements.get().len(),
            events = events.get().len(),
            "Campus store ready"
        );

        Self {
            keys,
            requests,
            announcements,
            events,
        }
    }

    /// The persisted keys in use.
    #[must_use]
    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    // === Requests ===

    /// Current requests, newest first.
    #[must_use]
    pub fn requests(&self) -> Arc<Vec<Request>> {
        self.requests.get()
    }

    /// Re-render hook for the requests collection.
    #[must_use]
    pub fn watch_requests(&self) -> watch::Receiver<Arc<Vec<Request>>> {
        self.requests.watch()
    }

    /// Add a request at the front of the collection.
    pub fn add_request(&self, request: Request) -> Arc<Vec<Request>> {
        debug!(id = %request.id, "Adding request");
        self.requests.update(|prev| prepend(request, prev))
    }

    /// Move a request to a new status.
    pub fn update_request_status(&self, id: &str, status: RequestStatus) -> Arc<Vec<Request>> {
        self.update_request(id, &RequestPatch::status(status))
    }

    /// Merge `patch` into the request with `id`.
    pub fn update_request(&self, id: &str, patch: &RequestPatch) -> Arc<Vec<Request>> {
        update_by_id(&self.requests, id, |request| patch.apply(request))
    }

    // === Announcements ===

    /// Current announcements, newest first.
    #[must_use]
    pub fn announcements(&self) -> Arc<Vec<Announcement>> {
        self.announcements.get()
    }

    /// Re-render hook for the announcements collection.
    #[must_use]
    pub fn watch_announcements(&self) -> watch::Receiver<Arc<Vec<Announcement>>> {
        self.announcements.watch()
    }

    /// Add an announcement at the front of the collection.
    pub fn add_announcement(&self, announcement: Announcement) -> Arc<Vec<Announcement>> {
        debug!(id = announcement.id, "Adding announcement");
        self.announcements.update(|prev| prepend(announcement, prev))
    }

    /// Merge `patch` into the announcement with `id`.
    pub fn update_announcement(
        &self,
        id: i64,
        patch: &AnnouncementPatch,
    ) -> Arc<Vec<Announcement>> {
        update_by_id(&self.announcements, &id, |announcement| patch.apply(announcement))
    }

    // === Calendar events ===

    /// Current calendar events, in creation order.
    #[must_use]
    pub fn campus_events(&self) -> Arc<Vec<CampusEvent>> {
        self.events.get()
    }

    /// Re-render hook for the calendar events collection.
    #[must_use]
    pub fn watch_campus_events(&self) -> watch::Receiver<Arc<Vec<CampusEvent>>> {
        self.events.watch()
    }

    /// Add a calendar event at the end of the collection.
    pub fn add_campus_event(&self, event: CampusEvent) -> Arc<Vec<CampusEvent>> {
        debug!(id = %event.id, "Adding calendar event");
        self.events.update(|prev| {
            let mut next = prev.clone();
            next.push(event);
            next
        })
    }

    /// Merge `patch` into the calendar event with `id`.
    pub fn update_campus_event(&self, id: &str, patch: &CampusEventPatch) -> Arc<Vec<CampusEvent>> {
        update_by_id(&self.events, id, |event| patch.apply(event))
    }

    /// Remove the calendar event with `id`.
    pub fn remove_campus_event(&self, id: &str) -> Arc<Vec<CampusEvent>> {
        if !contains(&self.events.get(), id) {
            debug!(id = %id, "Calendar event not found, nothing removed");
            return self.events.get();
        }

        debug!(id = %id, "Removing calendar event");
        self.events.update(|prev| {
            prev.iter()
                .filter(|event| event.id() != id)
                .cloned()
                .collect()
        })
    }
}

fn prepend<R: Clone>(record: R, prev: &[R]) -> Vec<R> {
    let mut next = Vec::with_capacity(prev.len() + 1);
    next.push(record);
    next.extend_from_slice(prev);
    next
}

fn contains<R: Record>(records: &[R], id: &R::Id) -> bool {
    records.iter().any(|record| record.id() == id)
}

/// Replace the record matching `id` with `merge(record)`, leaving order intact.
fn update_by_id<R, F>(cell: &SharedCell<Vec<R>>, id: &R::Id, merge: F) -> Arc<Vec<R>>
where
    R: Record
        + Clone
        + serde::Serialize
        + serde::de::DeserializeOwned
        + PartialEq
        + Send
        + Sync
        + 'static,
    R::Id: std::fmt::Debug,
    F: Fn(&R) -> R,
{
    if !contains(&cell.get(), id) {
        debug!(key = %cell.key(), id = ?id, "Record not found, update skipped");
        return cell.get();
    }

    cell.update(|prev| {
        prev.iter()
            .map(|record| {
                if record.id() == id {
                    merge(record)
                } else {
                    record.clone()
                }
            })
            .collect()
    })
}
