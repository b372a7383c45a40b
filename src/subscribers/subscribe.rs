//! # Lifecycle event hook
//!
//! Implement [`Subscribe`] to observe reconnects, chain rebuilds and listener
//! bindings. A [`SubscriberSet`](crate::subscribers::SubscriberSet) gives every
//! subscriber its own worker and bounded queue, so a slow subscriber only
//! delays itself; once its queue is full its events are dropped and a
//! `SubscriberOverflow` event is published instead.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use connvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct ReconnectCounter(AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for ReconnectCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ConnectionFaulted {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "reconnect-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of lifecycle events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Runs on this subscriber's worker, one event at a time, in bus order.
    async fn on_event(&self, event: &Event);

    /// Label used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this subscriber before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
