//! The event bus: type-keyed routing of posted events
//!
//! `EventBus` maps the runtime type of a posted value to the
//! [`SubscriberSet`](crate::registry) holding its listeners. Routing
//! entries are created lazily on first registration and retained for the
//! bus lifetime — a small permanent footprint per distinct event type in
//! exchange for a contention-free read path. Locking is fine-grained:
//! one lock for the routing table, one per subscriber set, so traffic on
//! unrelated event types never contends.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::affinity::ThreadAffinity;
use crate::error::{BusError, Result};
use crate::listener::{AnyEvent, Event, EventListener, TypedListener};
use crate::metrics::BusMetrics;
use crate::registry::{ObjectId, SubscriberSet};

/// In-process publish/subscribe bus keyed by event runtime type
///
/// Objects register listeners for events of a given type; posting a value
/// delivers it to every listener registered for exactly that type. All
/// operations may be called concurrently from any thread.
///
/// ```rust
/// use std::sync::Arc;
/// use typebus::EventBus;
///
/// struct FrameRendered {
///     frame: u64,
/// }
///
/// let bus = EventBus::new();
/// let owner = Arc::new(());
///
/// bus.register(&owner, Arc::new(|event: &FrameRendered| {
///     assert_eq!(event.frame, 1);
/// }))
/// .unwrap();
///
/// bus.post(FrameRendered { frame: 1 });
/// bus.unregister(&owner);
/// ```
#[derive(Default)]
pub struct EventBus {
    /// Event type → its subscriber set; entries added lazily, never removed
    routes: RwLock<HashMap<TypeId, Arc<SubscriberSet>>>,
    metrics: BusMetrics,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_set(&self, type_id: TypeId) -> Option<Arc<SubscriberSet>> {
        self.routes.read().get(&type_id).cloned()
    }

    fn set_or_create(&self, type_id: TypeId) -> Arc<SubscriberSet> {
        if let Some(set) = self.existing_set(type_id) {
            return set;
        }
        self.routes.write().entry(type_id).or_default().clone()
    }

    /// Register `listener` for events of type `E`, delivered on any thread
    ///
    /// `owner` scopes the subscription for later bulk removal via
    /// [`unregister`](EventBus::unregister); identity is the `Arc`
    /// allocation, so clones of one `Arc` count as the same registrant
    /// while equal-but-distinct objects do not. The bus keeps a reference
    /// to `owner` as long as it has subscriptions, so its identity stays
    /// unambiguous even after the caller drops every clone.
    ///
    /// # Errors
    ///
    /// [`BusError::ListenerIsRegistrant`] when `owner` and `listener` are
    /// the same allocation, [`BusError::DuplicateSubscription`] when this
    /// (owner, listener) pair is already registered for `E`.
    pub fn register<O, E, L>(&self, owner: &Arc<O>, listener: Arc<L>) -> Result<()>
    where
        O: Send + Sync + 'static,
        E: Event,
        L: EventListener<E>,
    {
        self.register_inner::<O, E, L>(owner, None, listener)
    }

    /// Register `listener` with a thread affinity
    ///
    /// When an event is posted from the affinity's owning thread the
    /// listener runs inline; from any other thread the delivery is handed
    /// to the affinity's executor. One affinity may back any number of
    /// registrations.
    pub fn register_with_affinity<O, E, L>(
        &self,
        owner: &Arc<O>,
        affinity: Arc<ThreadAffinity>,
        listener: Arc<L>,
    ) -> Result<()>
    where
        O: Send + Sync + 'static,
        E: Event,
        L: EventListener<E>,
    {
        self.register_inner::<O, E, L>(owner, Some(affinity), listener)
    }

    fn register_inner<O, E, L>(
        &self,
        owner: &Arc<O>,
        affinity: Option<Arc<ThreadAffinity>>,
        listener: Arc<L>,
    ) -> Result<()>
    where
        O: Send + Sync + 'static,
        E: Event,
        L: EventListener<E>,
    {
        let owner: Arc<dyn Any + Send + Sync> = owner.clone();
        let owner_id = ObjectId::of(&owner);
        let listener_id = ObjectId::of(&listener);
        if owner_id == listener_id {
            self.metrics.record_register_error();
            return Err(BusError::ListenerIsRegistrant);
        }

        let set = self.set_or_create(TypeId::of::<E>());
        let erased = Arc::new(TypedListener::<E, L>::new(listener));
        if let Err(err) = set.register(owner, affinity, listener_id, erased, type_name::<E>()) {
            self.metrics.record_register_error();
            return Err(err);
        }

        self.metrics.record_register();
        tracing::trace!(event_type = type_name::<E>(), "listener registered");
        Ok(())
    }

    /// Remove every subscription owned by `owner`, across all event types
    ///
    /// No-op when the owner has no active subscriptions.
    pub fn unregister<O: ?Sized>(&self, owner: &Arc<O>) {
        let owner_id = ObjectId::of(owner);
        let sets: Vec<Arc<SubscriberSet>> = self.routes.read().values().cloned().collect();

        let mut removed = 0;
        for set in sets {
            removed += set.unregister(owner_id);
        }
        if removed > 0 {
            self.metrics.record_unregister(removed as u64);
            tracing::trace!(count = removed, "subscriptions removed");
        }
    }

    /// Remove `owner`'s subscriptions for event type `E` only
    ///
    /// Subscriptions the same owner holds for other event types stay
    /// active. No-op when none exist.
    pub fn unregister_from<O, E>(&self, owner: &Arc<O>)
    where
        O: ?Sized,
        E: Event,
    {
        let Some(set) = self.existing_set(TypeId::of::<E>()) else {
            return;
        };
        let removed = set.unregister(ObjectId::of(owner));
        if removed > 0 {
            self.metrics.record_unregister(removed as u64);
            tracing::trace!(
                event_type = type_name::<E>(),
                count = removed,
                "subscriptions removed"
            );
        }
    }

    /// Post an event to every listener registered for its type
    ///
    /// No-op when nothing listens for `E` — posting an event nobody wants
    /// is normal. Listeners without affinity, and those whose affinity
    /// matches the posting thread, run inline before this call returns;
    /// the rest are handed to their executors without waiting.
    ///
    /// # Panics
    ///
    /// A panicking inline listener unwinds out of `post` and aborts the
    /// remaining deliveries of this call; the bus itself stays usable.
    /// Panics inside handed-off listeners are the executor's concern.
    pub fn post<E: Event>(&self, event: E) {
        let Some(set) = self.existing_set(TypeId::of::<E>()) else {
            return;
        };

        let event: Arc<AnyEvent> = Arc::new(event);
        let (inline, handoff) = set.post(&event);
        self.metrics.record_post(inline as u64, handoff as u64);
        tracing::trace!(
            event_type = type_name::<E>(),
            inline,
            handoff,
            "event posted"
        );
    }

    /// Post `E::default()` — convenience for payload-less marker events
    ///
    /// Equivalent to `post(E::default())`; the `Default` bound replaces
    /// any runtime construction failure with a compile-time requirement.
    pub fn post_default<E: Event + Default>(&self) {
        self.post(E::default());
    }

    /// Dispatch counters for this bus
    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }
}
