//! # Connection capability provider.
//!
//! The broker client is opaque to this crate. It is consumed through two traits:
//! - [`ConnectionFactory`] builds connections, optionally with [`Credentials`];
//! - [`Connection`] is one live, long-lived broker connection.
//!
//! A connection reports unrecoverable transport problems through the
//! [`FaultHandler`] installed with [`Connection::set_fault_handler`]. The handler may
//! be invoked from any thread, at any time, possibly more than once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::session::{AckMode, Session};
use crate::error::ProviderError;

/// Registry type tag of published connections.
pub const CONNECTION_TYPE: &str = "Connection";

/// Registry type tag of published connection factories.
pub const CONNECTION_FACTORY_TYPE: &str = "ConnectionFactory";

/// Registry type tag of published XA-capable connection factories.
pub const XA_CONNECTION_FACTORY_TYPE: &str = "XAConnectionFactory";

/// Callback invoked by a connection when it detects a fault.
pub type FaultHandler = Arc<dyn Fn(ProviderError) + Send + Sync>;

/// User name and password for connection construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Provider identification reported by a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub provider_name: String,
    pub provider_version: String,
    pub protocol_version: String,
}

/// # Factory for broker connections.
///
/// Construction may block on network I/O; it is only ever called from the
/// supervisor's retry loop, never concurrently for the same supervisor.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Creates a new connection; `None` uses the factory's default identity.
    async fn create(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn Connection>, ProviderError>;

    /// Releases resources held by the factory itself (pools, threads).
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// # One live broker connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Assigns the client identifier; must happen before `start`.
    async fn set_client_id(&self, client_id: &str) -> Result<(), ProviderError>;

    /// Installs the callback that receives asynchronous faults.
    fn set_fault_handler(&self, handler: FaultHandler);

    /// Starts (or resumes) message delivery.
    async fn start(&self) -> Result<(), ProviderError>;

    /// Pauses message delivery.
    async fn stop(&self) -> Result<(), ProviderError>;

    /// Releases the connection and all sessions created from it.
    async fn close(&self) -> Result<(), ProviderError>;

    /// Opens a session on this connection.
    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> Result<Arc<dyn Session>, ProviderError>;

    /// Provider identification, if the client exposes it.
    fn metadata(&self) -> Option<ConnectionMetadata> {
        None
    }
}
