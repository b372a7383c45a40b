//! Binding parameters of one registered listener.

use crate::error::LifecycleError;
use crate::properties::Properties;
use crate::provider::{AckMode, Destination};

/// Property key of the queue to consume from.
pub const QUEUE_KEY: &str = "connvisor.consumer.queue";
/// Property key of the topic to consume from.
pub const TOPIC_KEY: &str = "connvisor.consumer.topic";
/// Property key of the message selector.
pub const SELECTOR_KEY: &str = "connvisor.consumer.selector";
/// Property key of the no-local flag.
pub const NON_LOCAL_KEY: &str = "connvisor.consumer.nonlocal";
/// Property key of the acknowledgement mode.
pub const SESSION_MODE_KEY: &str = "connvisor.session.mode";
/// Property key of the transacted flag.
pub const SESSION_TRANSACTED_KEY: &str = "connvisor.session.transacted";

/// How a listener binds: destination, selector and session parameters.
///
/// ## Example
/// ```rust
/// use connvisor::consumers::ListenerSettings;
/// use connvisor::{AckMode, Properties};
///
/// let s = ListenerSettings::from_properties(
///     &Properties::new()
///         .with("connvisor.consumer.queue", "orders")
///         .with("connvisor.session.mode", "CLIENT_ACKNOWLEDGE"),
/// )
/// .unwrap();
/// assert_eq!(s.ack_mode, AckMode::Client);
/// assert_eq!(s.destination.name(), "orders");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerSettings {
    pub destination: Destination,
    pub selector: Option<String>,
    pub no_local: bool,
    pub transacted: bool,
    pub ack_mode: AckMode,
}

impl ListenerSettings {
    pub fn queue(name: impl Into<String>) -> Self {
        Self::on(Destination::Queue(name.into().trim().to_string()))
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::on(Destination::Topic(name.into().trim().to_string()))
    }

    fn on(destination: Destination) -> Self {
        Self {
            destination,
            selector: None,
            no_local: false,
            transacted: false,
            ack_mode: AckMode::default(),
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    pub fn no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    /// Parses and validates listener properties.
    ///
    /// ### Errors
    /// [`LifecycleError::Configuration`] when neither or both of queue and topic
    /// are present (even if blank), the destination name is blank, or the session mode is not a known acknowledgement mode.
    pub fn from_properties(props: &Properties) -> Result<Self, LifecycleError> {
        let mut settings = match (props.get(QUEUE_KEY), props.get(TOPIC_KEY)) {
            (Some(queue), None) => Self::queue(queue.trim()),
            (None, Some(topic)) => Self::topic(topic.trim()),
            (Some(_), Some(_)) => {
                return Err(LifecycleError::config(format!(
                    "only one of {QUEUE_KEY} and {TOPIC_KEY} may be set"
                )));
            }
            (None, None) => {
                return Err(LifecycleError::config(format!(
                    "one of {QUEUE_KEY} or {TOPIC_KEY} is required"
                )));
            }
        };

        if let Some(mode) = props.get_trimmed(SESSION_MODE_KEY) {
            settings.ack_mode = mode.parse()?;
        }
        settings.selector = props.get_trimmed(SELECTOR_KEY).map(str::to_string);
        settings.no_local = props.get_bool(NON_LOCAL_KEY);
        settings.transacted = props.get_bool(SESSION_TRANSACTED_KEY);
        settings.validate()?;
        Ok(settings)
    }

    /// Validates settings built by hand.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.destination.name().is_empty() {
            return Err(LifecycleError::config("destination name is empty"));
        }
        Ok(())
    }
}
