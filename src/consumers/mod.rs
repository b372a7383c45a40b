//! # Lazy per-listener binding with graceful drain.
//!
//! - [`ConsumerPool`] binds registered listeners to the published connection.
//! - [`ListenerSettings`] carries a listener's destination and session parameters.

mod pool;
mod settings;

pub use pool::ConsumerPool;
pub use settings::{
    ListenerSettings, NON_LOCAL_KEY, QUEUE_KEY, SELECTOR_KEY, SESSION_MODE_KEY,
    SESSION_TRANSACTED_KEY, TOPIC_KEY,
};
