//! Listener capabilities and the type-erased delivery unit
//!
//! Events are plain values routed by their runtime type. An
//! [`EventListener`] receives events of exactly one type; internally the
//! bus stores listeners behind a type-erased adapter so subscriptions for
//! different event types can share the same registry machinery.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Marker for values that can be posted to the bus
///
/// Blanket-implemented for every `'static + Send + Sync` type; events need
/// no derive or registration step.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

/// Used for listening to incoming events of one type
///
/// Implement on a struct, or pass a closure directly — any
/// `Fn(&E) + Send + Sync + 'static` is a listener.
pub trait EventListener<E: Event>: Send + Sync + 'static {
    /// Invoked when an event of type `E` is received
    fn on_event(&self, event: &E);
}

impl<E: Event, F> EventListener<E> for F
where
    F: Fn(&E) + Send + Sync + 'static,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// Type-erased event value shared across deliveries of one post
pub(crate) type AnyEvent = dyn Any + Send + Sync;

/// Type-erased listener stored in the registry
pub(crate) trait ErasedListener: Send + Sync {
    fn deliver(&self, event: &AnyEvent);
}

/// Adapter binding a typed listener to the erased registry interface
pub(crate) struct TypedListener<E, L> {
    listener: Arc<L>,
    _event: PhantomData<fn(&E)>,
}

impl<E, L> TypedListener<E, L> {
    pub(crate) fn new(listener: Arc<L>) -> Self {
        Self {
            listener,
            _event: PhantomData,
        }
    }
}

impl<E: Event, L: EventListener<E>> ErasedListener for TypedListener<E, L> {
    fn deliver(&self, event: &AnyEvent) {
        // Routing is keyed by TypeId upstream, so the downcast only fails
        // if an event of the wrong type reaches this subscription; such an
        // event is not for this listener and is dropped.
        if let Some(event) = event.downcast_ref::<E>() {
            self.listener.on_event(event);
        }
    }
}

/// A single pending delivery: one event bound to one listener
///
/// Produced when dispatch must cross threads and handed to a
/// [`ThreadExecutor`](crate::ThreadExecutor). The executor's only
/// obligation is to call [`Delivery::complete`] on the intended thread;
/// the bus does not wait for or track completion.
pub struct Delivery {
    event: Arc<AnyEvent>,
    listener: Arc<dyn ErasedListener>,
}

impl Delivery {
    pub(crate) fn new(event: Arc<AnyEvent>, listener: Arc<dyn ErasedListener>) -> Self {
        Self { event, listener }
    }

    /// Invoke the listener with the event
    pub fn complete(self) {
        self.listener.deliver(self.event.as_ref());
    }
}
