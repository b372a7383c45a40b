//! # Sessions, consumers and message handlers.
//!
//! A [`Session`] is created from a [`Connection`](super::Connection) with a
//! transaction flag and an [`AckMode`]. Consumers created from a session deliver
//! messages to a caller-supplied [`MessageHandler`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{LifecycleError, ProviderError};
use crate::properties::Properties;

/// Acknowledgement mode of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AckMode {
    /// The session acknowledges each message once the handler returns.
    #[default]
    Auto,
    /// The application acknowledges explicitly.
    Client,
    /// Lazy acknowledgement; duplicates are possible.
    DupsOk,
}

impl AckMode {
    /// The conventional numeric code (`1`, `2`, `3`).
    pub fn code(self) -> u8 {
        match self {
            AckMode::Auto => 1,
            AckMode::Client => 2,
            AckMode::DupsOk => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AckMode::Auto => "AUTO_ACKNOWLEDGE",
            AckMode::Client => "CLIENT_ACKNOWLEDGE",
            AckMode::DupsOk => "DUPS_OK_ACKNOWLEDGE",
        }
    }
}

impl FromStr for AckMode {
    type Err = LifecycleError;

    /// Accepts the symbolic name, its short form or the numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "AUTO_ACKNOWLEDGE" | "AUTO" | "1" => Ok(AckMode::Auto),
            "CLIENT_ACKNOWLEDGE" | "CLIENT" | "2" => Ok(AckMode::Client),
            "DUPS_OK_ACKNOWLEDGE" | "DUPS_OK" | "3" => Ok(AckMode::DupsOk),
            other => Err(LifecycleError::config(format!(
                "unsupported acknowledge mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a consumer receives from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    Queue(String),
    Topic(String),
}

impl Destination {
    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(n) | Destination::Topic(n) => n,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Queue(n) => write!(f, "queue://{n}"),
            Destination::Topic(n) => write!(f, "topic://{n}"),
        }
    }
}

/// An opaque broker message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub properties: Properties,
}

/// Receives messages from a bound consumer.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, message: &Message);
}

/// One session on a connection.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Creates a consumer on `destination`.
    async fn create_consumer(
        &self,
        destination: &Destination,
        selector: Option<&str>,
        no_local: bool,
    ) -> Result<Arc<dyn Consumer>, ProviderError>;

    /// Closes the session and its consumers.
    async fn close(&self) -> Result<(), ProviderError>;
}

/// One consumer on a session.
pub trait Consumer: Send + Sync + 'static {
    /// Attaches the handler that receives delivered messages.
    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_mode_parsing() {
        assert_eq!("AUTO_ACKNOWLEDGE".parse::<AckMode>(), Ok(AckMode::Auto));
        assert_eq!(" 2 ".parse::<AckMode>(), Ok(AckMode::Client));
        assert_eq!("DUPS_OK".parse::<AckMode>(), Ok(AckMode::DupsOk));
        assert!("SESSION_TRANSACTED".parse::<AckMode>().is_err());
        assert_eq!(AckMode::default().code(), 1);
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::Queue("q1".into()).to_string(), "queue://q1");
        assert_eq!(Destination::Topic("t".into()).name(), "t");
    }
}
