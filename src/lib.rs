//! # typebus
//!
//! Type-keyed in-process event bus with thread-affinity dispatch.
//!
//! ## Overview
//!
//! `typebus` routes posted values to listeners by the value's runtime
//! type: register a listener for `FrameRendered` and it sees every
//! `FrameRendered` posted to the bus, nothing else. Delivery is exact-type
//! only — no wildcard or subtype matching. Registration, removal, and
//! posting are all safe to call concurrently from any thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use typebus::EventBus;
//!
//! struct DownloadFinished {
//!     bytes: u64,
//! }
//!
//! let bus = EventBus::new();
//!
//! // Any Arc works as a registrant; identity is the allocation
//! let owner = Arc::new(());
//! bus.register(&owner, Arc::new(|event: &DownloadFinished| {
//!     println!("{} bytes", event.bytes);
//! }))
//! .unwrap();
//!
//! bus.post(DownloadFinished { bytes: 4096 });
//!
//! // Drops every subscription this owner holds, for all event types
//! bus.unregister(&owner);
//! ```
//!
//! ## Thread affinity
//!
//! A [`ThreadAffinity`] pins a subscription to the thread it was created
//! on. Posts from that thread invoke the listener inline; posts from
//! anywhere else hand a [`Delivery`] to the affinity's [`ThreadExecutor`],
//! which completes it on the owning thread. [`QueueExecutor`] is the stock
//! executor for loop-driven threads.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use typebus::{EventBus, QueueExecutor, ThreadAffinity};
//!
//! struct Redraw;
//!
//! let bus = Arc::new(EventBus::new());
//! let executor = Arc::new(QueueExecutor::new());
//!
//! // Created on this thread, so this thread owns the affinity
//! let affinity = Arc::new(ThreadAffinity::new(executor.clone()));
//!
//! let owner = Arc::new(());
//! bus.register_with_affinity(&owner, affinity, Arc::new(|_: &Redraw| {
//!     // runs on the owning thread
//! }))
//! .unwrap();
//!
//! let poster = {
//!     let bus = bus.clone();
//!     std::thread::spawn(move || bus.post(Redraw))
//! };
//! poster.join().unwrap();
//!
//! // The cross-thread post queued a delivery; drain it here
//! assert!(executor.run_next(Duration::from_secs(1)));
//! ```
//!
//! ## Architecture
//!
//! - **EventBus** — routing table from event `TypeId` to its subscribers
//! - **EventListener** trait — receives events of one type; closures work
//! - **ThreadAffinity** / **ThreadExecutor** — inline-vs-handoff gate and
//!   the capability that performs the cross-thread hop
//! - **BusMetrics** — atomic dispatch counters with serializable snapshots

pub mod affinity;
pub mod bus;
pub mod error;
pub mod listener;
pub mod metrics;

mod registry;

// Re-export core types
pub use affinity::{QueueExecutor, ThreadAffinity, ThreadExecutor};
pub use bus::EventBus;
pub use error::{BusError, Result};
pub use listener::{Delivery, Event, EventListener};
pub use metrics::{BusMetrics, MetricsSnapshot};
