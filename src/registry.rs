//! Per-event-type subscriber registry
//!
//! A [`SubscriberSet`] keeps two views of the same subscriptions: an
//! ordered sequence (delivery order = registration order) and an index by
//! registering object for O(1) bulk removal. Both live under one lock and
//! never disagree. Dispatch iterates a snapshot, so structural mutation
//! from other threads can never corrupt an in-flight post.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::affinity::ThreadAffinity;
use crate::error::{BusError, Result};
use crate::listener::{AnyEvent, Delivery, ErasedListener};

/// Identity of a registrant or listener: the address of its `Arc` allocation
///
/// Reference identity, not value equality — two equal-but-distinct objects
/// compare unequal, two clones of one `Arc` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjectId(usize);

impl ObjectId {
    pub(crate) fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        ObjectId(Arc::as_ptr(object).cast::<()>() as usize)
    }
}

/// One registered listener; immutable after creation except for the
/// liveness flag cleared on unregister
pub(crate) struct Subscription {
    owner: ObjectId,
    listener_id: ObjectId,
    affinity: Option<Arc<ThreadAffinity>>,
    listener: Arc<dyn ErasedListener>,
    /// Cleared on unregister so a dispatch already holding a snapshot
    /// skips this entry instead of invoking a removed listener
    active: AtomicBool,
}

/// All live subscriptions for one event type
#[derive(Default)]
pub(crate) struct SubscriberSet {
    inner: RwLock<SetInner>,
}

/// One registrant's entry in the owner index
///
/// Holds the registrant allocation strongly: while an owner has live
/// subscriptions its address cannot be recycled by the allocator, so an
/// unrelated later allocation can never alias its identity.
struct OwnerEntry {
    handle: Arc<dyn Any + Send + Sync>,
    subscriptions: Vec<Arc<Subscription>>,
}

#[derive(Default)]
struct SetInner {
    /// Delivery order
    ordered: Vec<Arc<Subscription>>,
    /// Registrant → its subscriptions
    by_owner: HashMap<ObjectId, OwnerEntry>,
}

impl SubscriberSet {
    /// Append a subscription for the registrant behind `owner`
    ///
    /// Fails with [`BusError::DuplicateSubscription`] when the same
    /// (owner, listener) pair is already present; the existing
    /// registration is untouched.
    pub(crate) fn register(
        &self,
        owner: Arc<dyn Any + Send + Sync>,
        affinity: Option<Arc<ThreadAffinity>>,
        listener_id: ObjectId,
        listener: Arc<dyn ErasedListener>,
        event_type: &'static str,
    ) -> Result<()> {
        let owner_id = ObjectId::of(&owner);
        let mut inner = self.inner.write();

        if let Some(entry) = inner.by_owner.get(&owner_id) {
            if entry.subscriptions.iter().any(|s| s.listener_id == listener_id) {
                return Err(BusError::DuplicateSubscription { event_type });
            }
        }

        let subscription = Arc::new(Subscription {
            owner: owner_id,
            listener_id,
            affinity,
            listener,
            active: AtomicBool::new(true),
        });
        inner
            .by_owner
            .entry(owner_id)
            .or_insert_with(|| OwnerEntry {
                handle: owner,
                subscriptions: Vec::new(),
            })
            .subscriptions
            .push(subscription.clone());
        inner.ordered.push(subscription);
        Ok(())
    }

    /// Remove every subscription owned by `owner`, returning how many
    ///
    /// Both views are updated under the write lock; a concurrent post
    /// either sees a subscription live or skips it, never a half-removed
    /// state.
    pub(crate) fn unregister(&self, owner: ObjectId) -> usize {
        let mut inner = self.inner.write();
        let Some(OwnerEntry {
            handle,
            subscriptions,
        }) = inner.by_owner.remove(&owner)
        else {
            return 0;
        };
        for subscription in &subscriptions {
            subscription.active.store(false, Ordering::Release);
        }
        inner.ordered.retain(|s| s.owner != owner);
        // The registrant pin is released only after both views dropped it
        drop(handle);
        subscriptions.len()
    }

    /// Deliver `event` to every live subscription in registration order
    ///
    /// Iterates a snapshot taken under the read lock. Subscriptions
    /// removed after the snapshot are skipped via their liveness flag;
    /// ones added after it are not seen by this dispatch. Returns the
    /// (inline, handoff) delivery counts.
    pub(crate) fn post(&self, event: &Arc<AnyEvent>) -> (usize, usize) {
        let snapshot = self.inner.read().ordered.clone();

        let mut inline = 0;
        let mut handoff = 0;
        for subscription in &snapshot {
            if !subscription.active.load(Ordering::Acquire) {
                continue;
            }
            match &subscription.affinity {
                Some(affinity) if !affinity.is_owning_thread() => {
                    affinity.executor().execute(Delivery::new(
                        event.clone(),
                        subscription.listener.clone(),
                    ));
                    handoff += 1;
                }
                _ => {
                    subscription.listener.deliver(event.as_ref());
                    inline += 1;
                }
            }
        }
        (inline, handoff)
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        self.inner.read().ordered.len()
    }

    #[cfg(test)]
    fn views_agree(&self) -> bool {
        let inner = self.inner.read();
        let indexed: usize = inner
            .by_owner
            .values()
            .map(|entry| entry.subscriptions.len())
            .sum();
        indexed == inner.ordered.len()
            && inner.ordered.iter().all(|s| {
                inner.by_owner.get(&s.owner).is_some_and(|entry| {
                    entry.subscriptions.iter().any(|o| Arc::ptr_eq(o, s))
                })
            })
    }
}
