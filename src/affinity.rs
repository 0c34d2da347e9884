//! Thread affinity and the executor capability
//!
//! A [`ThreadAffinity`] pins a subscription to the thread it was created
//! on. When an event is posted from that same thread the listener runs
//! inline; otherwise the affinity's [`ThreadExecutor`] receives a
//! [`Delivery`] and is responsible for eventually completing it on the
//! owning thread. Handoff is fire-and-forget: `post` never blocks on
//! cross-thread completion.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::listener::Delivery;

/// Submits deliveries for execution on a specific thread
///
/// Implementations must guarantee that [`Delivery::complete`] is
/// eventually called for every delivery accepted — synchronously or
/// asynchronously, on whatever execution context they represent (a UI
/// thread, a worker pool, a queue drained by a loop). Failure handling
/// during handed-off invocation is the executor's responsibility.
pub trait ThreadExecutor: Send + Sync {
    /// Accept a delivery that originated on another thread
    fn execute(&self, delivery: Delivery);
}

/// Pins listener invocation to the thread this value was created on
///
/// Create the affinity *on the target thread* — it captures the current
/// thread identity at construction. One affinity may be shared across any
/// number of registrations.
pub struct ThreadAffinity {
    thread: ThreadId,
    executor: Arc<dyn ThreadExecutor>,
}

impl ThreadAffinity {
    /// Capture the calling thread as the owning thread
    pub fn new(executor: Arc<dyn ThreadExecutor>) -> Self {
        Self {
            thread: thread::current().id(),
            executor,
        }
    }

    /// Whether the calling thread is the one this affinity was created on
    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    pub(crate) fn executor(&self) -> &Arc<dyn ThreadExecutor> {
        &self.executor
    }
}

impl fmt::Debug for ThreadAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadAffinity")
            .field("thread", &self.thread)
            .finish_non_exhaustive()
    }
}

/// In-memory queue executor for loop-driven threads
///
/// The usual shape of a UI or game loop: `execute` enqueues without
/// blocking the posting thread, and the owning thread drains the queue
/// between frames with [`QueueExecutor::drain`] or blocks on
/// [`QueueExecutor::run_next`]. Also serves as the reference executor for
/// tests.
#[derive(Default)]
pub struct QueueExecutor {
    queue: Mutex<VecDeque<Delivery>>,
    ready: Condvar,
}

impl QueueExecutor {
    /// Create an empty queue executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries waiting to run
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Complete everything currently queued, returning how many ran
    ///
    /// Call from the owning thread. The lock is released while each
    /// listener runs, so a listener that posts again through this same
    /// executor cannot deadlock; deliveries it enqueues are picked up
    /// before `drain` returns.
    pub fn drain(&self) -> usize {
        let mut completed = 0;
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(delivery) => {
                    delivery.complete();
                    completed += 1;
                }
                None => return completed,
            }
        }
    }

    /// Block up to `timeout` for one delivery and complete it
    ///
    /// Returns `false` only once the full timeout elapsed with nothing
    /// queued. A wakeup whose delivery was claimed by a concurrent
    /// [`QueueExecutor::drain`] goes back to waiting out the remaining
    /// deadline.
    pub fn run_next(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(delivery) = queue.pop_front() {
                drop(queue);
                delivery.complete();
                return true;
            }
            if self.ready.wait_until(&mut queue, deadline).timed_out() {
                // One last pop covers a delivery enqueued right at expiry
                let Some(delivery) = queue.pop_front() else {
                    return false;
                };
                drop(queue);
                delivery.complete();
                return true;
            }
        }
    }
}

impl ThreadExecutor for QueueExecutor {
    fn execute(&self, delivery: Delivery) {
        self.queue.lock().push_back(delivery);
        self.ready.notify_one();
    }
}
