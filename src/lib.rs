//! # connvisor
//!
//! **connvisor** keeps broker connections, derived connection factories and
//! message listeners alive while the capabilities they depend on come and go.
//!
//! Capabilities (connection factories, pools, encryptors, connections) are
//! published into a [`Registry`]. Components watch the registry and build,
//! rebuild or tear down what they own as providers appear and disappear.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   configuration (pid → Properties)
//!            │
//!            ▼
//!   FactoryConfigManager ──► DependencyChain per pid
//!            │                 [StringEncryptor]? [PooledConnectionFactoryFactory]? ConnectionFactoryFactory
//!            │                 build: decrypt, create, publish
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (type tag + properties → provider, ranked)              │
//! └──────┬───────────────────────────────────────────────▲────────────┘
//!        │ ConnectionFactory added/removed               │ Connection published/unpublished
//!        ▼                                               │
//!   supervise() ──► DependencyChain ──► ConnectionSupervisor (retry loop, fault restart)
//!                                                        │
//!        ┌───────────────────────────────────────────────┘
//!        ▼
//!   ConsumerPool ──► bind task per listener ──► Session + Consumer ──► MessageHandler
//!
//! All components ── publish(Event) ──► Bus ──► Coordinator listener ──► SubscriberSet
//! ```
//!
//! ### Connection lifecycle
//! ```text
//! start(credentials, client_id)
//!
//! loop {
//!   ├─► publish ConnectionStarting{ attempt }
//!   ├─► factory.create(credentials) ─► set_client_id
//!   │       ├─ Ok  ──► set_fault_handler ─► publish to registry ─► start()
//!   │       │          └─ fault ─► unpublish, close, restart loop
//!   │       └─ Err ──► publish ConnectionFailed
//!   │                  ├─ delay = backoff.next(failures)
//!   │                  ├─ publish BackoffScheduled{ delay }
//!   │                  └─ sleep(delay) (cancellable by stop)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Registry**      | In-process capability directory with filters and ranking.        | [`Registry`], [`Filter`]                    |
//! | **Chains**        | Build a resource once every requirement has a provider.          | [`DependencyChain`], [`chain::Assembly`]    |
//! | **Connections**   | Reconnecting supervisor publishing one live connection.          | [`ConnectionSupervisor`]                    |
//! | **Consumers**     | Lazy listener binding with graceful drain.                       | [`ConsumerPool`]                            |
//! | **Factories**     | Configuration-derived, optionally pooled, connection factories.  | [`FactoryConfigManager`]                    |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom).           | [`Subscribe`], [`SubscriberSet`]            |
//! | **Errors**        | Typed lifecycle and provider errors.                             | [`LifecycleError`], [`ProviderError`]       |
//! | **Configuration** | Centralized runtime settings.                                    | [`Config`], [`BackoffPolicy`]               |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use connvisor::{Config, Coordinator, Filter, Properties};
//! use connvisor::consumers::ListenerSettings;
//! use connvisor::provider::{Message, MessageHandler};
//!
//! struct Print;
//!
//! #[async_trait::async_trait]
//! impl MessageHandler for Print {
//!     async fn on_message(&self, message: &Message) {
//!         println!("{} bytes", message.body.len());
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn connvisor::Subscribe>> = vec![Arc::new(connvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn connvisor::Subscribe>> = Vec::new();
//!
//!     let coordinator = Coordinator::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // Keep a connection named "orders" up whenever a connection factory is published.
//!     let connection = coordinator.supervise(None, &Properties::new().with("name", "orders"))?;
//!
//!     // Bind a listener to it once it is up.
//!     let pool = coordinator.consumer_pool("orders", Filter::eq("name", "orders"))?;
//!     pool.register("audit", ListenerSettings::queue("orders.created"), Arc::new(Print))?;
//!
//!     pool.unregister("audit");
//!     pool.shutdown_gracefully().await?;
//!     connection.deactivate().await;
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod policies;
mod properties;
mod subscribers;

pub mod chain;
pub mod connection;
pub mod consumers;
pub mod factory;
pub mod provider;
pub mod registry;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use chain::{CapabilityRequirement, ChainStatus, DependencyChain};
pub use config::{
    BACKOFF_MS_KEY, Config, DEFAULT_POOL_SIZE, DRAIN_TIMEOUT_MS_KEY, POOL_SIZE_KEY,
};
pub use connection::{ConnectionState, ConnectionSupervisor};
pub use consumers::ConsumerPool;
pub use core::{Coordinator, CoordinatorBuilder};
pub use error::{LifecycleError, ProviderError};
pub use events::{Bus, Event, EventKind};
pub use factory::FactoryConfigManager;
pub use policies::{BackoffPolicy, JitterPolicy};
pub use properties::{HIDDEN_PREFIX, ID_KEY, Properties, RANKING_KEY, TYPE_KEY, is_hidden, unhide};
pub use provider::{AckMode, Credentials};
pub use registry::{Filter, ProviderId, ProviderRef, Registration, Registry, Subscription};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
