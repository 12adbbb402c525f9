//! Keyed change notifications within and across contexts.
//!
//! A [`ChangeBus`] has two delivery paths behind one `publish`/`subscribe`
//! interface:
//!
//! - **intra-context**: every subscriber registered on this bus is called
//!   synchronously, exactly once per publish, in publish order;
//! - **inter-context**: the change is handed to an optional
//!   [`RemoteChannel`] so other processes can pick it up (see
//!   [`crate::sync::ChangeWatcher`]), which feeds it back in through
//!   [`ChangeBus::deliver`].
//!
//! Delivery is fire-and-forget. A remote channel failure is logged and the
//! local fan-out still happens.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifies one running context (one process holding the shared state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh random context id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ContextId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::UnknownContext(s.to_string()))
    }
}

/// A published change: the full serialized value now stored under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Storage key whose value changed.
    pub key: String,
    /// The new serialized value.
    pub value: String,
    /// Context that published the change.
    pub origin: ContextId,
    /// When the change was published.
    pub published_at: DateTime<Utc>,
}

impl Change {
    /// Create a change stamped with the current time.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>, origin: ContextId) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            origin,
            published_at: Utc::now(),
        }
    }

    /// BLAKE3 fingerprint of the carried value.
    #[must_use]
    pub fn digest(&self) -> String {
        crate::storage::digest(&self.value)
    }
}

/// Outbound path to other contexts.
pub trait RemoteChannel: Send + Sync + fmt::Debug {
    /// Make `change` visible to other contexts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium rejects the change.
    fn broadcast(&self, change: &Change) -> Result<()>;
}

type Handler = Arc<dyn Fn(&Change) + Send + Sync>;

struct Shared {
    origin: ContextId,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Handler)>>,
    remote: Option<Arc<dyn RemoteChannel>>,
}

impl Shared {
    fn subscribers(&self) -> MutexGuard<'_, Vec<(u64, Handler)>> {
        // Handlers never leave the list half-updated, so a poisoned lock is still usable
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("origin", &self.origin)
            .field("subscribers", &self.subscribers().len())
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Publish/subscribe channel for keyed change notifications.
///
/// Cloning is cheap; clones share subscribers and the remote channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    shared: Arc<Shared>,
}

impl ChangeBus {
    /// Create a bus for the given context with an optional remote channel.
    #[must_use]
    pub fn new(origin: ContextId, remote: Option<Arc<dyn RemoteChannel>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                origin,
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
                remote,
            }),
        }
    }

    /// Create a bus that only delivers inside this context.
    #[must_use]
    pub fn local() -> Self {
        Self::new(ContextId::new(), None)
    }

    /// The context this bus publishes as.
    #[must_use]
    pub fn origin(&self) -> ContextId {
        self.shared.origin
    }

    /// Whether publishes leave this context.
    #[must_use]
    pub fn is_cross_context(&self) -> bool {
        self.shared.remote.is_some()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers().len()
    }

    /// Publish a new serialized value for `key`.
    ///
    /// Every subscriber active at this moment is notified exactly once before
    /// this returns, and the change is forwarded to other contexts if a remote
    /// channel is configured.
    pub fn publish(&self, key: &str, text: &str) {
        self.send(key, text, None);
    }

    /// Publish on behalf of `sender`, which is not called back.
    ///
    /// For subscribers that have already applied the value themselves.
    pub fn publish_from(&self, sender: &Subscription, key: &str, text: &str) {
        self.send(key, text, Some(sender.id));
    }

    fn send(&self, key: &str, text: &str, skip: Option<u64>) {
        let change = Change::new(key, text, self.shared.origin);

        if let Some(remote) = &self.shared.remote {
            if let Err(e) = remote.broadcast(&change) {
                warn!(key = %key, error = %e, "Failed to broadcast change to other contexts");
            }
        }

        let delivered = self.dispatch(&change, skip);
        trace!(key = %key, delivered, "Published change");
    }

    /// Deliver a change that arrived from another context.
    ///
    /// Only the local subscribers are notified; the change is not forwarded
    /// again. Returns the number of subscribers called.
    pub fn deliver(&self, change: &Change) -> usize {
        let delivered = self.dispatch(change, None);
        trace!(
            key = %change.key,
            origin = %change.origin,
            delivered,
            "Delivered remote change"
        );
        delivered
    }

    /// Register a handler for every future change on this bus.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers().push((id, Arc::new(handler)));
        Subscription {
            id,
            bus: Arc::downgrade(&self.shared),
        }
    }

    fn dispatch(&self, change: &Change, skip: Option<u64>) -> usize {
        // Snapshot so handlers may publish or (un)subscribe without deadlocking
        let handlers: Vec<Handler> = self
            .shared
            .subscribers()
            .iter()
            .filter(|(id, _)| Some(*id) != skip)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(change);
        }
        handlers.len()
    }
}

/// Keeps a bus handler registered; dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<Shared>,
}

impl Subscription {
    /// Remove the handler from the bus.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.bus.upgrade() {
            shared.subscribers().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    fn recorder(bus: &ChangeBus) -> (Subscription, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe(move |change| {
            sink.lock()
                .unwrap()
                .push(format!("{}={}", change.key, change.value));
        });
        (sub, seen)
    }

    #[derive(Debug, Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Change>>,
    }

    impl RemoteChannel for RecordingChannel {
        fn broadcast(&self, change: &Change) -> Result<()> {
            self.sent.lock().unwrap().push(change.clone());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenChannel;

    impl RemoteChannel for BrokenChannel {
        fn broadcast(&self, _change: &Change) -> Result<()> {
            Err(Error::storage_unavailable("offline"))
        }
    }

    #[test]
    fn test_context_id_roundtrip_through_string() {
        let id = ContextId::new();
        let parsed: ContextId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_context_id_parse_rejects_garbage() {
        let err = "tab-1".parse::<ContextId>().unwrap_err();
        assert!(matches!(err, Error::UnknownContext(_)));
    }

    #[test]
    fn test_publish_reaches_every_local_subscriber_once() {
        let bus = ChangeBus::local();
        let (_a, seen_a) = recorder(&bus);
        let (_b, seen_b) = recorder(&bus);

        bus.publish("k", "1");

        assert_eq!(*seen_a.lock().unwrap(), vec!["k=1"]);
        assert_eq!(*seen_b.lock().unwrap(), vec!["k=1"]);
    }

    #[test]
    fn test_publish_order_preserved() {
        let bus = ChangeBus::local();
        let (_sub, seen) = recorder(&bus);

        bus.publish("a", "1");
        bus.publish("b", "2");
        bus.publish("a", "3");

        assert_eq!(*seen.lock().unwrap(), vec!["a=1", "b=2", "a=3"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = ChangeBus::local();
        let (sub, seen) = recorder(&bus);
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        bus.publish("k", "1");

        assert_eq!(bus.subscriber_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_subscription_unsubscribes() {
        let bus = ChangeBus::local();
        {
            let _sub = bus.subscribe(|_| {});
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let bus = ChangeBus::local();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        drop(sub);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = ChangeBus::local();
        let other = bus.clone();
        let (_sub, seen) = recorder(&bus);

        other.publish("k", "v");

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bus.origin(), other.origin());
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let bus = ChangeBus::local();
        let count = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let counter = Arc::clone(&count);
        let _sub = bus.subscribe(move |change| {
            counter.fetch_add(1, Ordering::SeqCst);
            if change.key == "first" {
                inner_bus.publish("second", "x");
            }
        });

        bus.publish("first", "x");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remote_channel_receives_publish() {
        let channel = Arc::new(RecordingChannel::default());
        let origin = ContextId::new();
        let bus = ChangeBus::new(origin, Some(channel.clone() as Arc<dyn RemoteChannel>));
        assert!(bus.is_cross_context());

        bus.publish("k", "v");

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "k");
        assert_eq!(sent[0].origin, origin);
    }

    #[test]
    fn test_remote_failure_still_delivers_locally() {
        let bus = ChangeBus::new(ContextId::new(), Some(Arc::new(BrokenChannel)));
        let (_sub, seen) = recorder(&bus);

        bus.publish("k", "v");

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_deliver_is_local_only() {
        let channel = Arc::new(RecordingChannel::default());
        let bus = ChangeBus::new(
            ContextId::new(),
            Some(channel.clone() as Arc<dyn RemoteChannel>),
        );
        let (_sub, seen) = recorder(&bus);

        let remote = Change::new("k", "remote", ContextId::new());
        assert_eq!(bus.deliver(&remote), 1);

        assert_eq!(*seen.lock().unwrap(), vec!["k=remote"]);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_publish_from_skips_sender() {
        let channel = Arc::new(RecordingChannel::default());
        let bus = ChangeBus::new(
            ContextId::new(),
            Some(channel.clone() as Arc<dyn RemoteChannel>),
        );
        let (sender, sender_seen) = recorder(&bus);
        let (_other, other_seen) = recorder(&bus);

        bus.publish_from(&sender, "k", "v");

        assert!(sender_seen.lock().unwrap().is_empty());
        assert_eq!(*other_seen.lock().unwrap(), vec!["k=v"]);
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_change_digest_matches_value() {
        let a = Change::new("k", "same", ContextId::new());
        let b = Change::new("other", "same", ContextId::new());
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
