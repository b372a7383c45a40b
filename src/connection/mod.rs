//! # Resilient connection establishment.
//!
//! - [`ConnectionSupervisor`] keeps one broker connection published, retrying with
//!   backoff and reconnecting after faults.
//! - [`ConnectionState`] is its observable phase.
//! - [`supervise`] runs a supervisor while a matching factory is in the registry.

mod provision;
mod state;
mod supervisor;

pub use provision::{
    CLIENT_ID_KEY, ConnectionSettings, NAME_KEY, PASSWORD_KEY, USERNAME_KEY, supervise,
};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
