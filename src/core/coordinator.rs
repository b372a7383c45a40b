//! # Coordinator: shared runtime for chains, supervisors and consumer pools.
//!
//! The [`Coordinator`] owns the event bus, a [`SubscriberSet`], the capability
//! [`Registry`] and the global [`Config`]. Components created through it share
//! all four, so their events reach the same subscribers and their publications
//! land in the same registry.
//!
//! ## High-level architecture
//! ```text
//! Coordinator::builder(cfg).with_subscribers(subs).build()
//!
//! Components (created on demand):
//!   factory_manager()        ──► FactoryConfigManager ──► DependencyChain per pid
//!   supervise(filter, props) ──► DependencyChain ──► ConnectionSupervisor
//!   consumer_pool(name, f)   ──► ConsumerPool (binds to published connections)
//!
//! Event flow:
//!   component ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit(&Event)
//!                                                                  ┌─────────┬─────────┐
//!                                                                  ▼         ▼         ▼
//!                                                           [queue S1] [queue S2] ... [queue SN]
//!
//! Shutdown path:
//!   shutdown()
//!     └─► listener forwards what the bus still holds, then exits
//!     └─► SubscriberSet::shutdown() waits for workers to drain their queues
//! ```
//!
//! Components are owned by the caller and stopped by the caller; `shutdown`
//! only closes the observability side.
//!
//! ## Example
//! ```rust
//! use connvisor::{Config, Coordinator, Properties};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::builder(Config::default()).build();
//!
//!     let chain = coordinator.supervise(None, &Properties::new().with("name", "orders"))?;
//!     assert!(!chain.is_built());
//!
//!     chain.deactivate().await;
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::builder::CoordinatorBuilder;
use crate::chain::{Assembly, CapabilityRequirement, DependencyChain};
use crate::config::Config;
use crate::connection::{ConnectionSupervisor, supervise};
use crate::consumers::ConsumerPool;
use crate::error::LifecycleError;
use crate::events::Bus;
use crate::factory::FactoryConfigManager;
use crate::properties::Properties;
use crate::provider::ConnectionFactory;
use crate::registry::{Filter, Registry};
use crate::subscribers::SubscriberSet;

/// Shared runtime: configuration, event delivery and the capability registry.
pub struct Coordinator {
    cfg: Config,
    bus: Bus,
    registry: Arc<Registry>,
    subs: Mutex<Option<Arc<SubscriberSet>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
}

impl Coordinator {
    /// Starts building a coordinator.
    pub fn builder(cfg: Config) -> CoordinatorBuilder {
        CoordinatorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: SubscriberSet,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry,
            subs: Mutex::new(Some(Arc::new(subs))),
            listener: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Creates a supervisor for connections made by `factory`, using the configured backoff.
    pub fn connection_supervisor(
        &self,
        name: impl Into<Arc<str>>,
        factory: Arc<dyn ConnectionFactory>,
        properties: Properties,
    ) -> Result<ConnectionSupervisor, LifecycleError> {
        Ok(
            ConnectionSupervisor::new(name, factory, Arc::clone(&self.registry), properties)?
                .with_bus(self.bus.clone())
                .with_backoff(self.cfg.backoff),
        )
    }

    /// Creates a consumer pool binding to connections matching `connection_filter`.
    pub fn consumer_pool(
        &self,
        name: impl Into<Arc<str>>,
        connection_filter: Filter,
    ) -> Result<ConsumerPool, LifecycleError> {
        ConsumerPool::new(
            name,
            &self.registry,
            connection_filter,
            &self.cfg,
            self.bus.clone(),
        )
    }

    /// Activates a dependency chain on this coordinator's registry.
    pub fn chain<A: Assembly>(
        &self,
        name: impl Into<Arc<str>>,
        requirements: Vec<CapabilityRequirement>,
        assembly: A,
    ) -> Result<DependencyChain, LifecycleError> {
        DependencyChain::activate(&self.registry, self.bus.clone(), name, requirements, assembly)
    }

    /// Runs a connection supervisor while a matching connection factory is published.
    pub fn supervise(
        &self,
        factory_filter: Option<&str>,
        properties: &Properties,
    ) -> Result<DependencyChain, LifecycleError> {
        supervise(
            &self.registry,
            self.bus.clone(),
            self.cfg.clone(),
            factory_filter,
            properties,
        )
    }

    /// Creates a manager publishing configuration-derived connection factories.
    pub fn factory_manager(&self) -> FactoryConfigManager {
        FactoryConfigManager::new(&self.registry, self.bus.clone())
    }

    /// Flushes pending events to subscribers and stops their workers. Idempotent.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let listener = self.listener.lock().take();
        if let Some(handle) = listener {
            if let Err(e) = handle.await {
                warn!(error = %e, "subscriber listener terminated abnormally");
            }
        }

        let subs = self.subs.lock().take();
        if let Some(subs) = subs {
            match Arc::try_unwrap(subs) {
                Ok(set) => set.shutdown().await,
                Err(_) => warn!("subscriber set still shared at shutdown"),
            }
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(&self) {
        let Some(set) = self.subs.lock().clone() else {
            return;
        };
        let mut rx = self.bus.subscribe();
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    recv = rx.recv() => match recv {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => return,
                    },
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });
        *self.listener.lock() = Some(handle);
    }
}
