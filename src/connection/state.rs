use std::fmt;

/// Lifecycle phase of a supervised connection.
///
/// ```text
/// Idle ──start──► Connecting ──ok──► Connected ──fault/stop──► Idle
///                   ▲    │
///                   │    └──error──► Failed (backoff) ──► Connecting
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Idle,
    /// A construction attempt is running.
    Connecting,
    /// A connection is published.
    Connected,
    /// The last attempt failed; waiting out the backoff.
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
