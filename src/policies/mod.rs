//! Retry policies.
//!
//! This module groups the knobs that control **how long** the connection retry
//! loop waits between construction attempts.
//!
//! ## Contents
//! - [`BackoffPolicy`] delay after the n-th consecutive failure (first, factor, max)
//! - [`JitterPolicy`] spread of those delays across supervisors
//!
//! ## Quick wiring
//! ```text
//! Config { backoff: BackoffPolicy, .. }
//!      └─► connection::ConnectionSupervisor retry loop uses
//!           backoff.next(failures) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → constant 2s, no jitter.
//! - `BackoffPolicy::exponential(first, max)` doubles per failure.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
