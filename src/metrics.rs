//! Dispatch metrics
//!
//! Cheap atomic counters updated on the hot path. Export a point-in-time
//! [`MetricsSnapshot`] for dashboards or assertions; counters use relaxed
//! ordering, so a snapshot taken during concurrent activity is a close
//! approximation rather than a cut.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters maintained by [`EventBus`](crate::EventBus)
#[derive(Debug, Default)]
pub struct BusMetrics {
    registered: AtomicU64,
    register_errors: AtomicU64,
    unregistered: AtomicU64,
    posts: AtomicU64,
    inline_deliveries: AtomicU64,
    handoffs: AtomicU64,
}

impl BusMetrics {
    pub(crate) fn record_register(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_register_error(&self) {
        self.register_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unregister(&self, count: u64) {
        self.unregistered.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_post(&self, inline: u64, handoff: u64) {
        self.posts.fetch_add(1, Ordering::Relaxed);
        self.inline_deliveries.fetch_add(inline, Ordering::Relaxed);
        self.handoffs.fetch_add(handoff, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            register_errors: self.register_errors.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            posts: self.posts.load(Ordering::Relaxed),
            inline_deliveries: self.inline_deliveries.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.registered.store(0, Ordering::Relaxed);
        self.register_errors.store(0, Ordering::Relaxed);
        self.unregistered.store(0, Ordering::Relaxed);
        self.posts.store(0, Ordering::Relaxed);
        self.inline_deliveries.store(0, Ordering::Relaxed);
        self.handoffs.store(0, Ordering::Relaxed);
    }
}

/// Serializable snapshot of [`BusMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Successful registrations
    pub registered: u64,
    /// Rejected registrations (duplicate or self-listening)
    pub register_errors: u64,
    /// Subscriptions removed
    pub unregistered: u64,
    /// `post` calls that resolved a subscriber set
    pub posts: u64,
    /// Listeners invoked on the posting thread
    pub inline_deliveries: u64,
    /// Deliveries handed to an executor
    pub handoffs: u64,
}
