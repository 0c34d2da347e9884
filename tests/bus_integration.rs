//! End-to-end tests for the event bus
//!
//! Exercises the full dispatch surface: registration lifecycle,
//! type-scoped removal, thread-affinity routing across real threads,
//! panic propagation, and registry consistency under concurrent churn.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use typebus::{BusError, Delivery, EventBus, QueueExecutor, ThreadAffinity, ThreadExecutor};

#[derive(Default)]
struct TestEvent1;

#[derive(Default)]
struct TestEvent2;

struct Measured {
    value: u64,
}

/// Executor that completes inline on the posting thread, counting handoffs
#[derive(Default)]
struct ImmediateExecutor {
    handoffs: AtomicUsize,
}

impl ThreadExecutor for ImmediateExecutor {
    fn execute(&self, delivery: Delivery) {
        self.handoffs.fetch_add(1, Ordering::SeqCst);
        delivery.complete();
    }
}

fn counting<E: typebus::Event>(
    count: &Arc<AtomicUsize>,
) -> Arc<impl Fn(&E) + Send + Sync + 'static> {
    let count = count.clone();
    Arc::new(move |_: &E| {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

// ─── Registration & Delivery ─────────────────────────────────────

#[test]
fn register_then_post_delivers_that_instance_once() {
    let bus = EventBus::new();
    let owner = Arc::new(());
    let seen = Arc::new(AtomicUsize::new(0));

    let seen_clone = seen.clone();
    bus.register(
        &owner,
        Arc::new(move |event: &Measured| {
            assert_eq!(event.value, 99);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    bus.post(Measured { value: 99 });
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn delivery_follows_registration_order() {
    let bus = EventBus::new();
    let owner_a = Arc::new(());
    let owner_b = Arc::new(());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let first = order.clone();
    bus.register(
        &owner_a,
        Arc::new(move |_: &TestEvent1| {
            first.lock().push("first");
        }),
    )
    .unwrap();
    let second = order.clone();
    bus.register(
        &owner_b,
        Arc::new(move |_: &TestEvent1| {
            second.lock().push("second");
        }),
    )
    .unwrap();

    bus.post(TestEvent1);
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[test]
fn duplicate_registration_fails_and_first_survives() {
    let bus = EventBus::new();
    let owner = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));

    let listener = counting::<TestEvent1>(&count);
    bus.register(&owner, listener.clone()).unwrap();
    let err = bus.register(&owner, listener).unwrap_err();
    assert!(matches!(err, BusError::DuplicateSubscription { .. }));

    bus.post(TestEvent1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// ─── Unregistration ──────────────────────────────────────────────

#[test]
fn unregister_owner_silences_all_event_types() {
    let bus = EventBus::new();
    let owner = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));

    bus.register(&owner, counting::<TestEvent1>(&count)).unwrap();
    bus.register(&owner, counting::<TestEvent2>(&count)).unwrap();

    bus.unregister(&owner);
    bus.post(TestEvent1);
    bus.post(TestEvent2);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn unregister_from_leaves_other_event_types_active() {
    let bus = EventBus::new();
    let owner = Arc::new(());
    let event1_count = Arc::new(AtomicUsize::new(0));
    let event2_count = Arc::new(AtomicUsize::new(0));

    bus.register(&owner, counting::<TestEvent1>(&event1_count))
        .unwrap();
    bus.register(&owner, counting::<TestEvent2>(&event2_count))
        .unwrap();

    bus.unregister_from::<_, TestEvent1>(&owner);
    bus.post(TestEvent1);
    bus.post(TestEvent2);

    assert_eq!(event1_count.load(Ordering::SeqCst), 0);
    assert_eq!(event2_count.load(Ordering::SeqCst), 1);
}

#[test]
fn owner_dropped_by_caller_keeps_its_subscriptions() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    let owner = Arc::new(0u64);
    bus.register(&owner, counting::<TestEvent1>(&count)).unwrap();
    drop(owner);

    // The bus holds the registrant while it has subscriptions, so
    // same-sized allocations made afterwards can never take over its
    // address and unregister on its behalf.
    for _ in 0..64 {
        let unrelated = Arc::new(1u64);
        bus.unregister(&unrelated);
    }

    bus.post(TestEvent1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// ─── Default construction ────────────────────────────────────────

#[test]
fn post_default_and_explicit_instance_behave_identically() {
    let bus = EventBus::new();
    let owner = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));

    bus.register(&owner, counting::<TestEvent1>(&count)).unwrap();

    bus.post_default::<TestEvent1>();
    bus.post(TestEvent1::default());
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

// ─── Thread affinity ─────────────────────────────────────────────

#[test]
fn affinity_on_posting_thread_skips_executor() {
    let bus = EventBus::new();
    let owner = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(ImmediateExecutor::default());

    // Affinity created on the same thread that will post
    let affinity = Arc::new(ThreadAffinity::new(executor.clone()));
    bus.register_with_affinity(&owner, affinity, counting::<TestEvent1>(&count))
        .unwrap();

    bus.post(TestEvent1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(executor.handoffs.load(Ordering::SeqCst), 0);
}

#[test]
fn affinity_cross_thread_routes_through_executor_once() {
    let bus = Arc::new(EventBus::new());
    let owner = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(QueueExecutor::new());

    // This thread owns the affinity; another thread posts
    let affinity = Arc::new(ThreadAffinity::new(executor.clone()));
    bus.register_with_affinity(&owner, affinity, counting::<TestEvent1>(&count))
        .unwrap();

    let poster = {
        let bus = bus.clone();
        thread::spawn(move || bus.post(TestEvent1))
    };
    poster.join().unwrap();

    // Handoff is fire-and-forget: the post returned without invoking
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(executor.pending(), 1);

    assert!(executor.run_next(Duration::from_secs(2)));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(executor.pending(), 0);
}

#[test]
fn handed_off_listener_runs_on_owning_thread() {
    let bus = Arc::new(EventBus::new());
    let (ready_tx, ready_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let loop_bus = bus.clone();
    let loop_thread = thread::spawn(move || {
        let executor = Arc::new(QueueExecutor::new());
        let affinity = Arc::new(ThreadAffinity::new(executor.clone()));
        let owner = Arc::new(());

        let done = parking_lot::Mutex::new(done_tx.clone());
        loop_bus
            .register_with_affinity(
                &owner,
                affinity,
                Arc::new(move |event: &Measured| {
                    done.lock()
                        .send((thread::current().id(), event.value))
                        .unwrap();
                }),
            )
            .unwrap();
        ready_tx.send(()).unwrap();

        // Drain one delivery, then exit
        assert!(executor.run_next(Duration::from_secs(5)));
        thread::current().id()
    });

    ready_rx.recv().unwrap();
    bus.post(Measured { value: 17 });

    let (invoked_on, value) = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let loop_id = loop_thread.join().unwrap();
    assert_eq!(invoked_on, loop_id);
    assert_eq!(value, 17);
}

#[test]
fn shared_affinity_hands_off_each_subscription() {
    let bus = Arc::new(EventBus::new());
    let owner = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(QueueExecutor::new());
    let affinity = Arc::new(ThreadAffinity::new(executor.clone()));

    bus.register_with_affinity(&owner, affinity.clone(), counting::<TestEvent1>(&count))
        .unwrap();
    bus.register_with_affinity(&owner, affinity, counting::<TestEvent1>(&count))
        .unwrap();

    let poster = {
        let bus = bus.clone();
        thread::spawn(move || bus.post(TestEvent1))
    };
    poster.join().unwrap();

    assert_eq!(executor.pending(), 2);
    assert_eq!(executor.drain(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

// ─── Failure propagation ─────────────────────────────────────────

#[test]
fn panicking_listener_aborts_remaining_deliveries() {
    let bus = EventBus::new();
    let owner_a = Arc::new(());
    let owner_b = Arc::new(());
    let count = Arc::new(AtomicUsize::new(0));

    bus.register(
        &owner_a,
        Arc::new(|_: &TestEvent1| panic!("listener failure")),
    )
    .unwrap();
    bus.register(&owner_b, counting::<TestEvent1>(&count)).unwrap();

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| bus.post(TestEvent1)));
    assert!(result.is_err());
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // The bus stays usable; removing the failing listener restores delivery
    bus.unregister(&owner_a);
    bus.post(TestEvent1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// ─── Concurrency ─────────────────────────────────────────────────

#[test]
fn concurrent_register_unregister_churn_stays_consistent() {
    let bus = Arc::new(EventBus::new());
    let count = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let bus = bus.clone();
        let count = count.clone();
        handles.push(thread::spawn(move || {
            let owner = Arc::new(());
            for _ in 0..100 {
                bus.register(&owner, counting::<TestEvent1>(&count)).unwrap();
                bus.register(&owner, counting::<TestEvent2>(&count)).unwrap();
                bus.post(TestEvent1);
                bus.unregister(&owner);
            }
            // Leave exactly one live subscription behind
            bus.register(&owner, counting::<TestEvent1>(&count)).unwrap();
            owner
        }));
    }

    // Keep the owners alive past the final post
    let owners: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    count.store(0, Ordering::SeqCst);
    bus.post(TestEvent1);
    assert_eq!(count.load(Ordering::SeqCst), owners.len());
}

#[test]
fn concurrent_posts_and_registrations_do_not_interfere() {
    let bus = Arc::new(EventBus::new());
    let delivered = Arc::new(AtomicUsize::new(0));
    let anchor = Arc::new(());

    // One stable listener that must see every post
    bus.register(&anchor, counting::<Measured>(&delivered)).unwrap();

    let mut handles = Vec::new();
    for thread_index in 0..4 {
        let bus = bus.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                bus.post(Measured {
                    value: (thread_index * 50 + i) as u64,
                });
            }
        }));
    }
    for _ in 0..4 {
        let bus = bus.clone();
        handles.push(thread::spawn(move || {
            let owner = Arc::new(());
            for _ in 0..50 {
                bus.register(&owner, Arc::new(|_: &Measured| {})).unwrap();
                bus.unregister(&owner);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(delivered.load(Ordering::SeqCst), 200);
    assert_eq!(bus.metrics().snapshot().posts, 200);
}

// ─── Metrics ─────────────────────────────────────────────────────

#[test]
fn metrics_snapshot_covers_handoffs_and_serializes() {
    let bus = Arc::new(EventBus::new());
    let owner = Arc::new(());
    let executor = Arc::new(QueueExecutor::new());
    let affinity = Arc::new(ThreadAffinity::new(executor.clone()));

    bus.register_with_affinity(&owner, affinity, Arc::new(|_: &TestEvent1| {}))
        .unwrap();
    bus.register(&owner, Arc::new(|_: &TestEvent1| {})).unwrap();

    let poster = {
        let bus = bus.clone();
        thread::spawn(move || bus.post(TestEvent1))
    };
    poster.join().unwrap();
    executor.drain();

    let snap = bus.metrics().snapshot();
    assert_eq!(snap.registered, 2);
    assert_eq!(snap.posts, 1);
    assert_eq!(snap.inline_deliveries, 1);
    assert_eq!(snap.handoffs, 1);

    let json = serde_json::to_string(&snap).unwrap();
    assert!(json.contains("\"inlineDeliveries\":1"));
    assert!(json.contains("\"handoffs\":1"));
}
