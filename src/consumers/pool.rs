//! # ConsumerPool: lazy per-listener binding with graceful drain.
//!
//! Listeners register with [`ListenerSettings`] and a [`MessageHandler`]. Each
//! registration gets a bind task that waits for a published connection, opens a
//! session and consumer, and attaches the handler.
//!
//! ## Architecture
//! ```text
//! register(id) ──► listeners map ──► bind task ──► [permit] ──► poll connection ──► session + consumer
//!                                                    (Semaphore)   (bind_poll, cancellable)
//! unregister(id) ──► remove from map ──► unbind task ──► close session
//!
//! Registry: connection removed ──► unbind sessions on it ──► new bind task per listener
//! ```
//!
//! ## Rules
//! - The listeners map is only locked for insert/remove/lookup, never across I/O.
//! - A listener's bind and unbind serialize on its own binding slot, so an unbind
//!   waits for an in-progress bind and a bind never resurrects an unregistered listener.
//! - Bind tasks hold a pool permit; unbind tasks do not.
//! - A bind failure closes the partial session and drops the registration.
//! - The pool never owns the connection; it only looks it up in the registry.
//! - Dropping the pool cancels pending binds and closes bound sessions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::settings::ListenerSettings;
use crate::config::Config;
use crate::error::{LifecycleError, ProviderError};
use crate::events::{Bus, Event, EventKind};
use crate::properties::Properties;
use crate::provider::{CONNECTION_TYPE, Connection, Consumer, MessageHandler, Session};
use crate::registry::{
    Filter, ProviderId, ProviderRef, Registry, RegistryEvent, RegistryListener, Subscription,
};

struct Binding {
    connection: ProviderId,
    session: Arc<dyn Session>,
    _consumer: Arc<dyn Consumer>,
}

#[derive(Default)]
struct BindingSlot {
    torn_down: bool,
    active: Option<Binding>,
}

struct Entry {
    id: Arc<str>,
    settings: ListenerSettings,
    handler: Arc<dyn MessageHandler>,
    token: CancellationToken,
    bound: AtomicBool,
    binding: tokio::sync::Mutex<BindingSlot>,
}

/// Connections matching the pool's filter, as seen through registry events.
#[derive(Default)]
struct ConnectionView {
    candidates: BTreeMap<ProviderId, ProviderRef>,
    synced: bool,
    early_removals: HashSet<ProviderId>,
}

impl ConnectionView {
    fn best(&self) -> Option<&ProviderRef> {
        self.candidates
            .values()
            .reduce(|best, p| if p.outranks(best) { p } else { best })
    }
}

struct PoolShared {
    name: Arc<str>,
    bus: Bus,
    bind_poll: Duration,
    drain_poll: Duration,
    drain_limit: Option<Duration>,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    runtime: Handle,
    accepting: AtomicBool,
    connections: Mutex<ConnectionView>,
    listeners: Mutex<HashMap<Arc<str>, Arc<Entry>>>,
}

/// Binds registered listeners to the supervised connection.
pub struct ConsumerPool {
    shared: Arc<PoolShared>,
    subscription: Mutex<Option<Subscription>>,
}

impl ConsumerPool {
    /// Creates a pool that binds to connections matching `connection_filter`.
    ///
    /// Concurrency, poll intervals and the drain bound come from `config`.
    /// Requires a Tokio runtime context.
    pub fn new(
        name: impl Into<Arc<str>>,
        registry: &Arc<Registry>,
        connection_filter: Filter,
        config: &Config,
        bus: Bus,
    ) -> Result<Self, LifecycleError> {
        let runtime = Handle::try_current()
            .map_err(|_| LifecycleError::config("consumer pool requires a Tokio runtime"))?;
        let shared = Arc::new(PoolShared {
            name: name.into(),
            bus,
            bind_poll: config.bind_poll,
            drain_poll: config.drain_poll,
            drain_limit: config.drain_limit(),
            semaphore: Arc::new(Semaphore::new(config.pool_size_or_default())),
            tracker: TaskTracker::new(),
            runtime,
            accepting: AtomicBool::new(true),
            connections: Mutex::new(ConnectionView::default()),
            listeners: Mutex::new(HashMap::new()),
        });

        let weak: Weak<PoolShared> = Arc::downgrade(&shared);
        let listener: RegistryListener = Arc::new(move |ev: &RegistryEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.on_connection_event(ev);
            }
        });
        let filter = Filter::type_tag(CONNECTION_TYPE).and_filter(&connection_filter);
        let (subscription, snapshot) = registry.subscribe(filter, listener);
        {
            let mut view = shared.connections.lock();
            for provider in snapshot {
                if !view.early_removals.contains(&provider.id()) {
                    view.candidates.insert(provider.id(), provider);
                }
            }
            view.early_removals.clear();
            view.synced = true;
        }

        debug!(pool = %shared.name, pool_size = config.pool_size_or_default(), "consumer pool created");
        Ok(Self {
            shared,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Registers a listener and schedules its bind.
    ///
    /// ### Errors
    /// - [`LifecycleError::Configuration`] on invalid settings or a duplicate id.
    /// - [`LifecycleError::ShutdownInProgress`] once draining has begun.
    pub fn register(
        &self,
        id: impl Into<Arc<str>>,
        settings: ListenerSettings,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), LifecycleError> {
        let id = id.into();
        settings.validate()?;
        let shared = &self.shared;
        if !shared.accepting.load(Ordering::SeqCst) {
            return Err(LifecycleError::ShutdownInProgress {
                component: "consumer pool",
            });
        }

        let entry = Arc::new(Entry {
            id: Arc::clone(&id),
            settings,
            handler,
            token: CancellationToken::new(),
            bound: AtomicBool::new(false),
            binding: tokio::sync::Mutex::new(BindingSlot::default()),
        });
        {
            let mut listeners = shared.listeners.lock();
            if listeners.contains_key(&id) {
                return Err(LifecycleError::config(format!(
                    "listener '{id}' is already registered"
                )));
            }
            listeners.insert(Arc::clone(&id), Arc::clone(&entry));
        }

        debug!(pool = %shared.name, listener = %id, destination = %entry.settings.destination, "listener registered");
        shared
            .bus
            .publish(Event::new(EventKind::ListenerRegistered).with_subject(id));
        shared.spawn_bind(entry);
        Ok(())
    }

    /// Parses `properties` into [`ListenerSettings`] and registers.
    pub fn register_properties(
        &self,
        id: impl Into<Arc<str>>,
        properties: &Properties,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), LifecycleError> {
        let settings = ListenerSettings::from_properties(properties)?;
        self.register(id, settings, handler)
    }

    /// Removes a listener and schedules its unbind. Never blocks.
    ///
    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        let shared = &self.shared;
        let Some(entry) = shared.listeners.lock().remove(id) else {
            return false;
        };
        entry.token.cancel();
        debug!(pool = %shared.name, listener = %id, "listener unregistered");
        shared
            .bus
            .publish(Event::new(EventKind::ListenerUnregistered).with_subject(Arc::clone(&entry.id)));

        let task_shared = Arc::clone(shared);
        shared.tracker.spawn_on(
            async move { task_shared.unbind(&entry, "unregistered").await },
            &shared.runtime,
        );
        true
    }

    /// Stops accepting registrations and waits until every listener is gone.
    ///
    /// Polls every `drain_poll` until the registration set is empty and no bind
    /// or unbind task is outstanding, then shuts the worker pool down.
    ///
    /// ### Errors
    /// [`LifecycleError::DrainTimeout`] when the configured bound elapses first;
    /// the remaining listeners are then unbound before returning.
    pub async fn shutdown_gracefully(&self) -> Result<(), LifecycleError> {
        let shared = &self.shared;
        shared.accepting.store(false, Ordering::SeqCst);
        info!(pool = %shared.name, listeners = self.len(), "graceful drain started");
        shared
            .bus
            .publish(Event::new(EventKind::DrainStarted).with_subject(Arc::clone(&shared.name)));

        let started = Instant::now();
        let outcome = loop {
            if shared.listeners.lock().is_empty() && shared.tracker.is_empty() {
                break Ok(());
            }
            if let Some(limit) = shared.drain_limit {
                if started.elapsed() >= limit {
                    let remaining = self.ids();
                    warn!(pool = %shared.name, ?remaining, "graceful drain timed out; unbinding remaining listeners");
                    for id in &remaining {
                        self.unregister(id);
                    }
                    break Err(LifecycleError::DrainTimeout {
                        timeout: limit,
                        remaining,
                    });
                }
            }
            time::sleep(shared.drain_poll).await;
        };

        shared.semaphore.close();
        self.subscription.lock().take();
        shared.tracker.close();
        shared.tracker.wait().await;

        let kind = match outcome {
            Ok(()) => EventKind::DrainCompleted,
            Err(_) => EventKind::DrainTimedOut,
        };
        info!(pool = %shared.name, "graceful drain finished");
        shared
            .bus
            .publish(Event::new(kind).with_subject(Arc::clone(&shared.name)));
        outcome
    }

    pub fn len(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.shared.listeners.lock().contains_key(id)
    }

    /// True if `id` is registered and currently has a live binding.
    pub fn is_bound(&self, id: &str) -> bool {
        self.shared
            .listeners
            .lock()
            .get(id)
            .is_some_and(|e| e.bound.load(Ordering::SeqCst))
    }

    /// Registered listener ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .shared
            .listeners
            .lock()
            .keys()
            .map(|k| k.to_string())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }
}

impl Drop for ConsumerPool {
    /// Abandons every listener without waiting: pending binds are cancelled and
    /// bound sessions are closed in the background.
    fn drop(&mut self) {
        let shared = &self.shared;
        shared.accepting.store(false, Ordering::SeqCst);
        shared.semaphore.close();
        self.subscription.get_mut().take();

        let entries: Vec<Arc<Entry>> = shared.listeners.lock().drain().map(|(_, e)| e).collect();
        if !entries.is_empty() {
            debug!(pool = %shared.name, listeners = entries.len(), "consumer pool dropped; releasing listeners");
        }
        for entry in entries {
            entry.token.cancel();
            let task_shared = Arc::clone(shared);
            shared.tracker.spawn_on(
                async move { task_shared.unbind(&entry, "pool dropped").await },
                &shared.runtime,
            );
        }
        shared.tracker.close();
    }
}

impl PoolShared {
    fn on_connection_event(self: &Arc<Self>, ev: &RegistryEvent) {
        match ev {
            RegistryEvent::Added(provider) => {
                debug!(pool = %self.name, connection = %provider.id(), "connection available");
                self.connections
                    .lock()
                    .candidates
                    .insert(provider.id(), provider.clone());
            }
            RegistryEvent::Removed(provider) => {
                let lost = provider.id();
                {
                    let mut view = self.connections.lock();
                    if view.candidates.remove(&lost).is_none() && !view.synced {
                        view.early_removals.insert(lost);
                    }
                }
                debug!(pool = %self.name, connection = %lost, "connection withdrawn");
                let entries: Vec<Arc<Entry>> = self.listeners.lock().values().cloned().collect();
                for entry in entries {
                    let shared = Arc::clone(self);
                    self.tracker.spawn_on(
                        async move { shared.release_lost(entry, lost).await },
                        &self.runtime,
                    );
                }
            }
        }
    }

    fn current_connection(&self) -> Option<(ProviderId, Arc<dyn Connection>)> {
        let view = self.connections.lock();
        let provider = view.best()?;
        provider
            .downcast::<dyn Connection>()
            .map(|conn| (provider.id(), conn))
    }

    fn is_current(&self, id: ProviderId) -> bool {
        self.connections.lock().best().is_some_and(|p| p.id() == id)
    }

    fn spawn_bind(self: &Arc<Self>, entry: Arc<Entry>) {
        let shared = Arc::clone(self);
        self.tracker
            .spawn_on(async move { shared.bind_task(entry).await }, &self.runtime);
    }

    async fn bind_task(self: Arc<Self>, entry: Arc<Entry>) {
        let _permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_closed) => return,
            },
            _ = entry.token.cancelled() => return,
        };

        loop {
            let (provider, connection) = loop {
                if entry.token.is_cancelled() {
                    return;
                }
                if let Some(found) = self.current_connection() {
                    break found;
                }
                tokio::select! {
                    _ = time::sleep(self.bind_poll) => {}
                    _ = entry.token.cancelled() => return,
                }
            };

            let mut slot = entry.binding.lock().await;
            if slot.torn_down || slot.active.is_some() {
                return;
            }
            if !self.is_current(provider) {
                continue;
            }

            match open_binding(connection.as_ref(), &entry).await {
                Ok((session, consumer)) => {
                    slot.active = Some(Binding {
                        connection: provider,
                        session,
                        _consumer: consumer,
                    });
                    entry.bound.store(true, Ordering::SeqCst);
                    info!(pool = %self.name, listener = %entry.id, connection = %provider, "listener bound");
                    self.bus
                        .publish(Event::new(EventKind::ListenerBound).with_subject(Arc::clone(&entry.id)));
                }
                Err(e) => {
                    slot.torn_down = true;
                    drop(slot);
                    warn!(pool = %self.name, listener = %entry.id, error = %e, "listener bind failed; registration dropped");
                    self.bus.publish(
                        Event::new(EventKind::ListenerBindFailed)
                            .with_subject(Arc::clone(&entry.id))
                            .with_reason(e.as_message()),
                    );
                    self.remove_if_same(&entry);
                }
            }
            return;
        }
    }

    /// Unbinds `entry` if it was bound to the withdrawn connection, then rebinds.
    async fn release_lost(self: Arc<Self>, entry: Arc<Entry>, lost: ProviderId) {
        let mut slot = entry.binding.lock().await;
        if !slot.active.as_ref().is_some_and(|b| b.connection == lost) {
            return;
        }
        if let Some(binding) = slot.active.take() {
            entry.bound.store(false, Ordering::SeqCst);
            self.close_binding(&entry, binding, "connection lost").await;
        }
        let rebind = !slot.torn_down;
        drop(slot);
        if rebind {
            self.spawn_bind(entry);
        }
    }

    async fn unbind(&self, entry: &Entry, reason: &'static str) {
        let mut slot = entry.binding.lock().await;
        slot.torn_down = true;
        if let Some(binding) = slot.active.take() {
            entry.bound.store(false, Ordering::SeqCst);
            self.close_binding(entry, binding, reason).await;
        }
    }

    async fn close_binding(&self, entry: &Entry, binding: Binding, reason: &'static str) {
        if let Err(e) = binding.session.close().await {
            debug!(pool = %self.name, listener = %entry.id, error = %e, "session close failed");
        }
        info!(pool = %self.name, listener = %entry.id, reason, "listener unbound");
        self.bus.publish(
            Event::new(EventKind::ListenerUnbound)
                .with_subject(Arc::clone(&entry.id))
                .with_reason(reason),
        );
    }

    fn remove_if_same(&self, entry: &Arc<Entry>) {
        let mut listeners = self.listeners.lock();
        if listeners
            .get(&entry.id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            listeners.remove(&entry.id);
        }
    }
}

/// Creates the session and consumer and attaches the handler.
///
/// On failure after the session exists, the session is closed before returning.
async fn open_binding(
    connection: &dyn Connection,
    entry: &Entry,
) -> Result<(Arc<dyn Session>, Arc<dyn Consumer>), ProviderError> {
    let s = &entry.settings;
    let session = connection.create_session(s.transacted, s.ack_mode).await?;
    let consumer = match session
        .create_consumer(&s.destination, s.selector.as_deref(), s.no_local)
        .await
        .and_then(|c| c.set_message_handler(Arc::clone(&entry.handler)).map(|()| c))
    {
        Ok(c) => c,
        Err(e) => {
            if let Err(close_err) = session.close().await {
                debug!(listener = %entry.id, error = %close_err, "partial session close failed");
            }
            return Err(e);
        }
    };
    Ok((session, consumer))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::connection::ConnectionSupervisor;
    use crate::provider::{AckMode, ConnectionFactory, Destination, Message};
    use crate::testing::{CountingHandler, MockFactory, eventually};

    fn fast_config() -> Config {
        Config {
            bind_poll: Duration::from_millis(10),
            drain_poll: Duration::from_millis(10),
            ..Config::default()
        }
    }

    fn pool(registry: &Arc<Registry>, config: &Config) -> ConsumerPool {
        ConsumerPool::new("listeners", registry, Filter::any(), config, Bus::new(256)).unwrap()
    }

    fn supervisor(factory: &Arc<MockFactory>, registry: &Arc<Registry>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            "broker",
            Arc::clone(factory) as Arc<dyn ConnectionFactory>,
            Arc::clone(registry),
            Properties::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_listener_binds_once_connection_appears_and_unbinds_on_stop() {
        let registry = Registry::new();
        let pool = pool(&registry, &fast_config());
        let handler = Arc::new(CountingHandler::default());

        pool.register(
            "L",
            ListenerSettings::queue("q1").with_ack_mode(AckMode::Auto),
            handler.clone(),
        )
        .unwrap();
        assert!(pool.contains("L"));
        assert!(!pool.is_bound("L"));

        let factory = MockFactory::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();
        assert!(eventually(Duration::from_secs(5), || pool.is_bound("L")).await);

        let conn = factory.last().unwrap();
        let session = conn.sessions()[0].clone();
        assert_eq!(session.ack_mode, AckMode::Auto);
        let consumer = session.consumers()[0].clone();
        assert_eq!(consumer.destination, Destination::Queue("q1".into()));
        assert!(consumer.deliver(&Message::default()).await);
        assert_eq!(handler.received.load(Ordering::SeqCst), 1);

        sup.stop();
        assert!(eventually(Duration::from_secs(5), || !pool.is_bound("L")).await);
        assert!(eventually(Duration::from_secs(5), || session.is_closed()).await);
        assert!(pool.contains("L"));

        assert!(pool.unregister("L"));
        pool.shutdown_gracefully().await.unwrap();
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let registry = Registry::new();
        let pool = pool(&registry, &fast_config());
        let handler = Arc::new(CountingHandler::default());

        let err = pool
            .register("blank", ListenerSettings::queue("  "), handler.clone())
            .unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_configuration");

        let err = pool
            .register_properties("none", &Properties::new(), handler.clone())
            .unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_configuration");

        pool.register("dup", ListenerSettings::topic("t"), handler.clone())
            .unwrap();
        let err = pool
            .register("dup", ListenerSettings::topic("t"), handler.clone())
            .unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_configuration");
        assert_eq!(pool.len(), 1);

        pool.unregister("dup");
        pool.shutdown_gracefully().await.unwrap();
        let err = pool
            .register("late", ListenerSettings::topic("t"), handler)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ShutdownInProgress { .. }));
    }

    #[tokio::test]
    async fn test_unregister_cancels_pending_bind() {
        let registry = Registry::new();
        let pool = pool(&registry, &fast_config());
        pool.register(
            "early",
            ListenerSettings::queue("q"),
            Arc::new(CountingHandler::default()),
        )
        .unwrap();
        assert!(pool.unregister("early"));
        assert!(!pool.unregister("early"));

        time::timeout(Duration::from_secs(1), pool.shutdown_gracefully())
            .await
            .expect("drain finished")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_pending_binds() {
        let registry = Registry::new();
        let pool = pool(&registry, &fast_config());
        pool.register("L", ListenerSettings::queue("q"), Arc::new(CountingHandler::default()))
            .unwrap();
        let state = Arc::downgrade(&pool.shared);
        drop(pool);

        time::sleep(Duration::from_secs(60)).await;
        assert!(state.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_drop_closes_bound_sessions() {
        let registry = Registry::new();
        let pool = pool(&registry, &fast_config());
        let factory = MockFactory::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();
        pool.register("L", ListenerSettings::topic("t"), Arc::new(CountingHandler::default()))
            .unwrap();
        assert!(eventually(Duration::from_secs(5), || pool.is_bound("L")).await);

        let session = factory.last().unwrap().sessions()[0].clone();
        drop(pool);
        assert!(eventually(Duration::from_secs(5), || session.is_closed()).await);
        sup.stop();
        sup.terminated().await;
    }

    #[tokio::test]
    async fn test_bind_failure_drops_registration_and_closes_session() {
        let registry = Registry::new();
        let factory = MockFactory::new();
        factory.fail_sessions.store(true, Ordering::SeqCst);
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        let pool = pool(&registry, &fast_config());
        pool.register(
            "broken",
            ListenerSettings::queue("q"),
            Arc::new(CountingHandler::default()),
        )
        .unwrap();

        assert!(eventually(Duration::from_secs(5), || !pool.contains("broken")).await);
        let conn = factory.last().unwrap();
        assert!(conn.sessions().iter().all(|s| s.is_closed()));
        pool.shutdown_gracefully().await.unwrap();
        sup.stop();
    }

    #[tokio::test]
    async fn test_rebinds_after_connection_fault() {
        let registry = Registry::new();
        let factory = MockFactory::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        let pool = pool(&registry, &fast_config());
        pool.register(
            "L",
            ListenerSettings::topic("prices"),
            Arc::new(CountingHandler::default()),
        )
        .unwrap();
        assert!(eventually(Duration::from_secs(5), || pool.is_bound("L")).await);
        let first = factory.last().unwrap();

        first.fault("heartbeat lost");
        assert!(eventually(Duration::from_secs(5), || {
            factory.connections().len() == 2
                && pool.is_bound("L")
                && factory.last().is_some_and(|c| c.sessions().len() == 1)
        })
        .await);
        assert!(first.sessions()[0].is_closed());

        pool.unregister("L");
        pool.shutdown_gracefully().await.unwrap();
        sup.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_unregister() {
        let registry = Registry::new();
        let pool = Arc::new(pool(&registry, &fast_config()));
        pool.register(
            "slow",
            ListenerSettings::queue("q"),
            Arc::new(CountingHandler::default()),
        )
        .unwrap();

        let remover = Arc::clone(&pool);
        let started = Instant::now();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(3)).await;
            remover.unregister("slow");
        });

        pool.shutdown_gracefully().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(pool.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout_unbinds_remaining() {
        let registry = Registry::new();
        let config = Config {
            drain_timeout: Duration::from_secs(1),
            ..fast_config()
        };
        let pool = pool(&registry, &config);
        pool.register(
            "stuck",
            ListenerSettings::queue("q"),
            Arc::new(CountingHandler::default()),
        )
        .unwrap();

        let err = pool.shutdown_gracefully().await.unwrap_err();
        match err {
            LifecycleError::DrainTimeout { timeout, remaining } => {
                assert_eq!(timeout, Duration::from_secs(1));
                assert_eq!(remaining, vec!["stuck".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_pool_size_bounds_concurrent_binds() {
        let registry = Registry::new();
        let config = Config {
            pool_size: 1,
            ..fast_config()
        };
        let pool = pool(&registry, &config);
        for id in ["a", "b", "c"] {
            pool.register(id, ListenerSettings::queue(id), Arc::new(CountingHandler::default()))
                .unwrap();
        }
        // one permit held by a poller; the others wait without binding
        assert!(eventually(Duration::from_secs(1), || {
            pool.shared.semaphore.available_permits() == 0
        })
        .await);

        let factory = MockFactory::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();
        assert!(eventually(Duration::from_secs(5), || {
            ["a", "b", "c"].iter().all(|id| pool.is_bound(id))
        })
        .await);

        for id in ["a", "b", "c"] {
            pool.unregister(id);
        }
        pool.shutdown_gracefully().await.unwrap();
        sup.stop();
    }
}
