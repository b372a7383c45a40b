//! # Broadcast channel for lifecycle events.
//!
//! Every component holds a clone of one [`Bus`] and publishes into it; the
//! coordinator's listener is normally the only receiver and forwards to the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//!   DependencyChain      ──┐
//!   ConnectionSupervisor ──┼──► Bus (ring of `capacity`) ──► Coordinator listener ──► SubscriberSet
//!   ConsumerPool         ──┘
//! ```
//!
//! Publishing never blocks. Events published while nobody listens are lost,
//! and a receiver that falls more than `capacity` events behind skips the
//! oldest ones (`RecvError::Lagged`).

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable, non-blocking publisher of [`Event`]s.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// A bus retaining at most `capacity` undelivered events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to current receivers; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// A receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    /// A bus with the default capacity of 1024 events.
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_receiver_sees_only_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ChainActivated));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ChainBuilt).with_subject("c"));
        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::ChainBuilt);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lagging_receiver_skips_oldest() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for n in 1..=3 {
            bus.publish(Event::new(EventKind::ConnectionStarting).with_attempt(n));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.expect("event").attempt, Some(2));
    }
}
