//! # LogWriter: tracing-backed event renderer
//!
//! A subscriber that renders incoming [`Event`]s through `tracing`, at a level
//! matching the event: failures and faults at `warn`, lifecycle milestones at
//! `info`, the rest at `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  connvisor: [published] subject="broker-a"
//! WARN  connvisor: [connection-failed] subject="broker-a" attempt=1 err="refused"
//! DEBUG connvisor: [backoff] subject="broker-a" delay_ms=2000 after_attempt=1
//! INFO  connvisor: [listener-bound] subject="orders"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let subject = e.subject.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ConnectionFailed
            | EventKind::ConnectionFaulted
            | EventKind::ChainBuildFailed
            | EventKind::ListenerBindFailed
            | EventKind::DrainTimedOut
            | EventKind::SubscriberOverflow
            | EventKind::SubscriberPanicked => {
                warn!(target: "connvisor", kind = ?e.kind, subject, attempt = ?e.attempt, err = reason, seq = e.seq);
            }
            EventKind::BackoffScheduled => {
                debug!(target: "connvisor", subject, delay_ms = ?e.delay_ms, after_attempt = ?e.attempt, "[backoff]");
            }
            EventKind::ConnectionStarting => {
                debug!(target: "connvisor", subject, attempt = ?e.attempt, "[connecting]");
            }
            _ => {
                info!(target: "connvisor", kind = ?e.kind, subject, generation = ?e.attempt, reason, seq = e.seq);
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
