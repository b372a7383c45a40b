use std::sync::Arc;

use super::coordinator::Coordinator;
use crate::{
    config::Config,
    events::Bus,
    registry::Registry,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Coordinator`] with optional features.
pub struct CoordinatorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    registry: Option<Arc<Registry>>,
}

impl CoordinatorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            registry: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events (chain builds, reconnects, bindings)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Shares an existing registry instead of creating a fresh one.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds and returns the Coordinator instance.
    ///
    /// Must be called within a Tokio runtime: subscriber workers and the bus
    /// listener are spawned here.
    pub fn build(self) -> Arc<Coordinator> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let registry = self.registry.unwrap_or_else(Registry::new);

        let coordinator = Arc::new(Coordinator::new_internal(self.cfg, bus, subs, registry));
        coordinator.subscriber_listener();
        coordinator
    }
}
