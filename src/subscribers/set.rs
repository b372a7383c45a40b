//! # Per-subscriber queues for lifecycle events.
//!
//! [`SubscriberSet`] hands each event to every subscriber without waiting for
//! any of them:
//!
//! ```text
//! emit(event) ──┬──► [bounded queue] ──► worker ──► LogWriter::on_event
//!               ├──► [bounded queue] ──► worker ──► metrics.on_event
//!               └──► [bounded queue] ──► worker ──► custom.on_event
//!                         │ full                       │ panic
//!                         ▼                            ▼
//!               SubscriberOverflow on Bus    SubscriberPanicked on Bus
//! ```
//!
//! Each subscriber sees events in emit order; there is no ordering between
//! subscribers. A panicking subscriber keeps its worker and receives the next
//! event.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use connvisor::{Bus, Event, Subscribe, SubscriberSet};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, _ev: &Event) {}
//!     fn name(&self) -> &'static str { "audit" }
//! }
//!
//! struct Alerts;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Alerts {
//!     async fn on_event(&self, _ev: &Event) {}
//!     fn name(&self) -> &'static str { "alerts" }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Audit), Arc::new(Alerts)];
//! let set = SubscriberSet::new(subscribers, Bus::new(64));
//! assert_eq!(set.len(), 2);
//! set.shutdown().await;
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out of lifecycle events to independent subscriber workers.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Requires a Tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut queues = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());
        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            queues.push(Queue {
                name: sub.name(),
                tx,
            });
            workers.push(tokio::spawn(run_worker(sub, rx, bus.clone())));
        }
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues `event` for every subscriber without copying it.
    ///
    /// A subscriber whose queue is full or closed misses the event and a
    /// `SubscriberOverflow` is published, unless the event is itself an overflow.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let overflow = event.kind == EventKind::SubscriberOverflow;
        for queue in &self.queues {
            let reason = match queue.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !overflow {
                self.bus
                    .publish(Event::subscriber_overflow(queue.name, reason));
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Closes every queue and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(event) = rx.recv().await {
        let delivery = AssertUnwindSafe(sub.on_event(&event)).catch_unwind().await;
        if let Err(panic) = delivery {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*panic)));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
