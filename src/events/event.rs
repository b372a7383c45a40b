//! # Lifecycle events emitted by chains, supervisors and consumer pools.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Chain events**: derived-resource build/destroy flow
//! - **Connection events**: retry loop, publication and faults
//! - **Listener events**: per-consumer bind/unbind and pool drain
//! - **Subscriber events**: fan-out health (overflow, panic)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! subject (chain, supervisor or listener name), reasons, and backoff delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use connvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_subject("broker-a")
//!     .with_reason("connection refused")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(2));
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.subject.as_deref(), Some("broker-a"));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subject`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subject`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Chain events ===
    /// Chain started watching the registry.
    ChainActivated,

    /// Every requirement resolved and the derived resource was built.
    ///
    /// Sets:
    /// - `subject`: chain name
    /// - `attempt`: build generation (1-based)
    ChainBuilt,

    /// The build function failed; the chain waits for the next requirement change.
    ///
    /// Sets:
    /// - `subject`: chain name
    /// - `reason`: failure message
    ChainBuildFailed,

    /// The derived resource was destroyed.
    ///
    /// Sets:
    /// - `subject`: chain name
    /// - `attempt`: generation that was destroyed
    /// - `reason`: why (`provider_removed`, `deactivated`)
    ChainDestroyed,

    /// Chain stopped watching the registry.
    ChainDeactivated,

    // === Connection events ===
    /// Retry loop is starting a construction attempt.
    ///
    /// Sets:
    /// - `subject`: supervisor name
    /// - `attempt`: attempt number (1-based, per retry loop)
    ConnectionStarting,

    /// A construction attempt failed.
    ///
    /// Sets:
    /// - `subject`: supervisor name
    /// - `attempt`: attempt number
    /// - `reason`: failure message
    ConnectionFailed,

    /// Next attempt scheduled after a failure.
    ///
    /// Sets:
    /// - `subject`: supervisor name
    /// - `attempt`: failed attempt number
    /// - `delay_ms`: delay before the next attempt (ms)
    /// - `reason`: last failure message
    BackoffScheduled,

    /// A connection was published.
    ConnectionPublished,

    /// The published connection reported a fault.
    ///
    /// Sets:
    /// - `subject`: supervisor name
    /// - `reason`: fault message
    ConnectionFaulted,

    /// The published connection was withdrawn (fault or stop).
    ConnectionUnpublished,

    /// The supervisor reached its terminal stopped state.
    SupervisorStopped,

    // === Listener events ===
    /// A listener registration was recorded.
    ListenerRegistered,

    /// A listener was bound to a connection (session + consumer live).
    ListenerBound,

    /// Binding failed; the registration was torn down.
    ///
    /// Sets:
    /// - `subject`: listener id
    /// - `reason`: failure message
    ListenerBindFailed,

    /// A listener binding was closed.
    ListenerUnbound,

    /// A listener registration was removed.
    ListenerUnregistered,

    /// Graceful drain of a consumer pool started.
    DrainStarted,

    /// Graceful drain finished with an empty registration set.
    DrainCompleted,

    /// Graceful drain exceeded its bound.
    ///
    /// Sets:
    /// - `reason`: remaining listener ids
    DrainTimedOut,
}

/// One lifecycle event.
///
/// Only `seq`, `at` and `kind` are always set; the [`EventKind`] docs say which
/// optional fields accompany each kind.
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide publication order.
    pub seq: u64,
    pub at: SystemTime,
    pub kind: EventKind,
    /// Chain, supervisor, pool, listener or subscriber name.
    pub subject: Option<Arc<str>>,
    /// Connection attempt or chain generation, starting at 1.
    pub attempt: Option<u32>,
    /// Scheduled reconnect delay, saturating at `u32::MAX` ms.
    pub delay_ms: Option<u32>,
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Stamps a new event with the next sequence number and the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subject: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(u32::try_from(d.as_millis()).unwrap_or(u32::MAX));
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// `subscriber` missed an event because its queue was `reason` ("full" or "closed").
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_subject(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// `subscriber` panicked while handling an event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_subject(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
