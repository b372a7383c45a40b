//! # Event subscribers for the connvisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! for handling lifecycle events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ConnectionSupervisor ── publish(Event) ──► Bus ──► Coordinator listener
//!                                                         │
//!                                                         └──► SubscriberSet::emit
//!                                                                ┌────┴────┬─────────┐
//!                                                                ▼         ▼         ▼
//!                                                            LogWriter  Metrics   Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
