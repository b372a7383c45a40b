//! # Capability provider interfaces.
//!
//! The wire protocol and broker client are external. This module defines the
//! traits through which the lifecycle components drive them:
//! - [`ConnectionFactory`] / [`Connection`] - connection construction and control
//! - [`Session`] / [`Consumer`] / [`MessageHandler`] - per-listener bindings

mod connection;
mod session;

pub use connection::{
    CONNECTION_FACTORY_TYPE, CONNECTION_TYPE, Connection, ConnectionFactory, ConnectionMetadata,
    Credentials, FaultHandler, XA_CONNECTION_FACTORY_TYPE,
};
pub use session::{AckMode, Consumer, Destination, Message, MessageHandler, Session};
