//! Error types for typebus

use thiserror::Error;

/// Errors that can occur in the event bus
///
/// All errors are detected and returned synchronously by the call that
/// triggered them; nothing is retried or logged internally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The registering object and the listener are the same allocation
    ///
    /// An object may not listen to itself — the registrant exists to scope
    /// bulk removal, the listener to receive events.
    #[error("listener must not be the registering object itself")]
    ListenerIsRegistrant,

    /// The same (object, listener) pair is already registered for this event type
    ///
    /// The first registration remains active and unaffected.
    #[error("listener already registered for event type '{event_type}'")]
    DuplicateSubscription {
        /// Name of the event type the pair was already registered for
        event_type: &'static str,
    },
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
