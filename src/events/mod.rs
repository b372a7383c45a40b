//! Lifecycle events and the bus that carries them.
//!
//! - [`EventKind`] and [`Event`]: what happened, to which subject, with which
//!   attempt, delay or reason.
//! - [`Bus`]: broadcast channel shared by every component.
//!
//! Chains, connection supervisors, consumer pools and subscriber workers
//! publish; the `Coordinator` listener forwards to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
