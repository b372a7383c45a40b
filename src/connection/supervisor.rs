//! # ConnectionSupervisor: one resilient broker connection.
//!
//! Keeps exactly one live connection published in the [`Registry`] and re-creates it
//! whenever construction fails or the connection reports a fault.
//!
//! ## Retry loop
//! ```text
//! loop {
//!   ├─► publish ConnectionStarting{ attempt }
//!   ├─► factory.create(credentials) (cancellable)
//!   │       ├─ Ok  ──► set_client_id ──► set_fault_handler ──► lock + publish ──► exit
//!   │       │            (stop: teardown)                            └──► spawn start()
//!   │       └─ Err, or fault before publish ──► publish ConnectionFailed, state = Failed
//!   │                  ├─ delay = backoff.next(failures)
//!   │                  ├─ publish BackoffScheduled{ delay, attempt }
//!   │                  └─ sleep(delay) (cancellable by stop)
//!   └─ exits when published or stopped
//! }
//! ```
//!
//! ## Rules
//! - At most one retry loop is alive per supervisor; a fault restarts it only
//!   when none is running.
//! - Publish, unpublish and the fault path serialize on one lock guarding the
//!   current connection. A fault from a connection that is no longer current
//!   (compared by generation) is ignored.
//! - `start()` on the connection runs in its own task so a slow start never
//!   delays publication; a start failure takes the fault path.
//! - `stop()` returns at once. Teardown (stop, then close) runs in a tracked
//!   task and swallows errors.
//!
//! Registry listeners are invoked while the supervisor lock is held and must not
//! call back into the supervisor synchronously.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::state::ConnectionState;
use crate::error::{LifecycleError, ProviderError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::properties::Properties;
use crate::provider::{CONNECTION_TYPE, Connection, ConnectionFactory, Credentials, FaultHandler};
use crate::registry::{Registration, Registry};

struct Published {
    generation: u64,
    connection: Arc<dyn Connection>,
    registration: Registration,
}

#[derive(Default)]
struct Guarded {
    stopped: bool,
    loop_running: bool,
    credentials: Option<Credentials>,
    client_id: Option<String>,
    current: Option<Published>,
    /// Fault reported by a connection that is built but not yet published.
    early_fault: Option<(u64, ProviderError)>,
}

enum Publication {
    Published,
    Stopped,
    Faulted(ProviderError),
}

struct Shared {
    name: Arc<str>,
    factory: Arc<dyn ConnectionFactory>,
    registry: Arc<Registry>,
    bus: Bus,
    backoff: BackoffPolicy,
    properties: Properties,
    guarded: Mutex<Guarded>,
    state: watch::Sender<ConnectionState>,
    generations: AtomicU64,
    token: CancellationToken,
    tracker: TaskTracker,
    runtime: Handle,
}

/// Owns the lifecycle of one shared broker connection.
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
}

impl ConnectionSupervisor {
    /// Creates an idle supervisor.
    ///
    /// The connection is published under [`CONNECTION_TYPE`] with `properties`.
    /// Requires a Tokio runtime context.
    pub fn new(
        name: impl Into<Arc<str>>,
        factory: Arc<dyn ConnectionFactory>,
        registry: Arc<Registry>,
        properties: Properties,
    ) -> Result<Self, LifecycleError> {
        let runtime = Handle::try_current()
            .map_err(|_| LifecycleError::config("connection supervisor requires a Tokio runtime"))?;
        let (state, _) = watch::channel(ConnectionState::Idle);
        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                factory,
                registry,
                bus: Bus::default(),
                backoff: BackoffPolicy::default(),
                properties,
                guarded: Mutex::new(Guarded::default()),
                state,
                generations: AtomicU64::new(0),
                token: CancellationToken::new(),
                tracker: TaskTracker::new(),
                runtime,
            }),
        })
    }

    /// Publishes lifecycle events on `bus`. Must be called before `start`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.bus = bus;
        }
        self
    }

    /// Uses `backoff` between failed attempts. Must be called before `start`.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.backoff = backoff;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Begins connecting in the background.
    ///
    /// Idempotent while running.
    ///
    /// ### Errors
    /// [`LifecycleError::ShutdownInProgress`] after [`stop`](Self::stop).
    pub fn start(
        &self,
        credentials: Option<Credentials>,
        client_id: Option<String>,
    ) -> Result<(), LifecycleError> {
        {
            let mut g = self.shared.guarded.lock();
            if g.stopped {
                return Err(LifecycleError::ShutdownInProgress {
                    component: "connection supervisor",
                });
            }
            g.credentials = credentials;
            g.client_id = client_id;
            if g.loop_running || g.current.is_some() {
                return Ok(());
            }
            g.loop_running = true;
        }
        info!(supervisor = %self.shared.name, "establishing broker connection");
        Arc::clone(&self.shared).spawn_loop();
        Ok(())
    }

    /// Stops the supervisor permanently.
    ///
    /// Unpublishes the current connection and tears it down in the background.
    /// Returns promptly; await [`terminated`](Self::terminated) to wait for teardown.
    pub fn stop(&self) {
        let shared = &self.shared;
        let current = {
            let mut g = shared.guarded.lock();
            if g.stopped {
                return;
            }
            g.stopped = true;
            g.current.take().map(|mut p| {
                p.registration.unpublish();
                p.connection
            })
        };
        shared.token.cancel();
        shared.state.send_replace(ConnectionState::Idle);

        if let Some(connection) = current {
            shared.bus.publish(
                Event::new(EventKind::ConnectionUnpublished)
                    .with_subject(Arc::clone(&shared.name))
                    .with_reason("stopped"),
            );
            shared.spawn_teardown(connection);
        }
        shared.tracker.close();
        info!(supervisor = %shared.name, "connection supervisor stopped");
        shared
            .bus
            .publish(Event::new(EventKind::SupervisorStopped).with_subject(Arc::clone(&shared.name)));
    }

    /// Resolves once stopped and all background work has finished.
    pub async fn terminated(&self) {
        self.shared.tracker.wait().await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The currently published connection, if any.
    pub fn current(&self) -> Option<Arc<dyn Connection>> {
        self.shared
            .guarded
            .lock()
            .current
            .as_ref()
            .map(|p| Arc::clone(&p.connection))
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.guarded.lock().stopped
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn spawn_loop(self: Arc<Self>) {
        let tracker = self.tracker.clone();
        let runtime = self.runtime.clone();
        tracker.spawn_on(
            async move {
                if !self.retry_loop().await {
                    self.guarded.lock().loop_running = false;
                }
            },
            &runtime,
        );
    }

    /// Returns true once a connection was handed to `publish`, which owns the
    /// `loop_running` flag from then on.
    async fn retry_loop(self: &Arc<Self>) -> bool {
        let mut attempt: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            if self.token.is_cancelled() {
                return false;
            }
            attempt = attempt.saturating_add(1);
            self.state.send_replace(ConnectionState::Connecting);
            self.bus.publish(
                Event::new(EventKind::ConnectionStarting)
                    .with_subject(Arc::clone(&self.name))
                    .with_attempt(attempt),
            );

            let (credentials, client_id) = {
                let g = self.guarded.lock();
                (g.credentials.clone(), g.client_id.clone())
            };
            let err = match self.connect(credentials.as_ref(), client_id.as_deref()).await {
                Ok(None) => return false,
                Ok(Some(connection)) => {
                    let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                    connection.set_fault_handler(self.fault_handler(generation));
                    match self.publish(Arc::clone(&connection), generation) {
                        Publication::Published => return true,
                        Publication::Stopped => {
                            debug!(supervisor = %self.name, "stopped during construction; discarding connection");
                            self.spawn_teardown(connection);
                            return false;
                        }
                        Publication::Faulted(e) => {
                            warn!(supervisor = %self.name, generation, error = %e, "connection faulted before publication");
                            self.spawn_teardown(connection);
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            failures = failures.saturating_add(1);
            warn!(supervisor = %self.name, attempt, error = %err, "connection attempt failed");
            self.state.send_replace(ConnectionState::Failed);
            self.bus.publish(
                Event::new(EventKind::ConnectionFailed)
                    .with_subject(Arc::clone(&self.name))
                    .with_attempt(attempt)
                    .with_reason(err.as_message()),
            );

            let delay = self.backoff.next(failures - 1);
            self.bus.publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_subject(Arc::clone(&self.name))
                    .with_delay(delay)
                    .with_attempt(attempt),
            );

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => {}
                _ = self.token.cancelled() => return false,
            }
        }
    }

    /// One construction attempt: create, then assign the client id.
    ///
    /// `Ok(None)` means the supervisor was stopped; a connection created before
    /// that has already been handed to teardown.
    async fn connect(
        &self,
        credentials: Option<&Credentials>,
        client_id: Option<&str>,
    ) -> Result<Option<Arc<dyn Connection>>, ProviderError> {
        let connection = tokio::select! {
            res = self.factory.create(credentials) => res?,
            _ = self.token.cancelled() => return Ok(None),
        };
        if let Some(meta) = connection.metadata() {
            info!(
                supervisor = %self.name,
                provider = %meta.provider_name,
                version = %meta.provider_version,
                protocol = %meta.protocol_version,
                "connection created"
            );
        }
        if let Some(id) = client_id {
            let assigned = tokio::select! {
                res = connection.set_client_id(id) => res,
                _ = self.token.cancelled() => {
                    debug!(supervisor = %self.name, "stopped while assigning client id; discarding connection");
                    self.spawn_teardown(Arc::clone(&connection));
                    return Ok(None);
                }
            };
            if let Err(e) = assigned {
                if let Err(close_err) = connection.close().await {
                    debug!(supervisor = %self.name, error = %close_err, "close after client id failure");
                }
                return Err(e);
            }
        }
        Ok(Some(connection))
    }

    /// Publishes `connection` unless stopped or already faulted, then starts it
    /// in a separate task.
    fn publish(self: &Arc<Self>, connection: Arc<dyn Connection>, generation: u64) -> Publication {
        {
            let mut g = self.guarded.lock();
            let early = g.early_fault.take();
            if g.stopped {
                return Publication::Stopped;
            }
            if let Some((faulted, err)) = early {
                if faulted == generation {
                    return Publication::Faulted(err);
                }
            }
            let registration = self.registry.publish::<dyn Connection>(
                CONNECTION_TYPE,
                Arc::clone(&connection),
                self.properties.clone(),
            );
            g.current = Some(Published {
                generation,
                connection: Arc::clone(&connection),
                registration,
            });
            g.loop_running = false;
        }

        self.state.send_replace(ConnectionState::Connected);
        info!(supervisor = %self.name, generation, "connection published");
        self.bus.publish(
            Event::new(EventKind::ConnectionPublished)
                .with_subject(Arc::clone(&self.name))
                .with_attempt(u32::try_from(generation).unwrap_or(u32::MAX)),
        );

        let shared = Arc::clone(self);
        self.tracker.spawn_on(
            async move {
                if let Err(e) = connection.start().await {
                    warn!(supervisor = %shared.name, error = %e, "connection start failed");
                    shared.on_fault(generation, e);
                }
            },
            &self.runtime,
        );
        Publication::Published
    }

    fn fault_handler(self: &Arc<Self>, generation: u64) -> FaultHandler {
        let weak: Weak<Shared> = Arc::downgrade(self);
        Arc::new(move |err: ProviderError| {
            if let Some(shared) = weak.upgrade() {
                shared.on_fault(generation, err);
            }
        })
    }

    /// Fault path: unpublish the faulted connection and reconnect unless stopped.
    fn on_fault(self: &Arc<Self>, generation: u64, err: ProviderError) {
        let (connection, restart) = {
            let mut g = self.guarded.lock();
            if g.current.as_ref().map(|p| p.generation) != Some(generation) {
                if g.current.is_none()
                    && g.loop_running
                    && generation == self.generations.load(Ordering::SeqCst)
                {
                    debug!(supervisor = %self.name, generation, "fault before publication");
                    g.early_fault = Some((generation, err));
                } else {
                    debug!(supervisor = %self.name, generation, "ignoring fault from stale connection");
                }
                return;
            }
            let Some(mut published) = g.current.take() else {
                return;
            };
            published.registration.unpublish();
            let restart = !g.stopped && !g.loop_running;
            if restart {
                g.loop_running = true;
            }
            (published.connection, restart)
        };

        error!(
            supervisor = %self.name,
            generation,
            error = %err,
            "connection fault; unpublishing and reconnecting"
        );
        self.bus.publish(
            Event::new(EventKind::ConnectionFaulted)
                .with_subject(Arc::clone(&self.name))
                .with_reason(err.as_message()),
        );
        self.bus.publish(
            Event::new(EventKind::ConnectionUnpublished)
                .with_subject(Arc::clone(&self.name))
                .with_reason("fault"),
        );
        self.state.send_replace(ConnectionState::Idle);
        self.spawn_teardown(connection);

        if restart {
            Arc::clone(self).spawn_loop();
        }
    }

    /// Best-effort stop then close; failures are logged only.
    fn spawn_teardown(&self, connection: Arc<dyn Connection>) {
        let name = Arc::clone(&self.name);
        self.tracker.spawn_on(
            async move {
                if let Err(e) = connection.stop().await {
                    debug!(supervisor = %name, error = %e, "connection stop failed");
                }
                if let Err(e) = connection.close().await {
                    debug!(supervisor = %name, error = %e, "connection close failed");
                }
            },
            &self.runtime,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::registry::Filter;
    use crate::testing::{MockFactory, eventually};

    fn supervisor(factory: &Arc<MockFactory>, registry: &Arc<Registry>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            "broker",
            Arc::clone(factory) as Arc<dyn ConnectionFactory>,
            Arc::clone(registry),
            Properties::new().with("name", "broker"),
        )
        .unwrap()
    }

    fn published(registry: &Registry) -> Vec<crate::registry::ProviderRef> {
        registry.find_providers(CONNECTION_TYPE, &Filter::any())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_are_spaced_by_backoff() {
        let factory = MockFactory::new();
        factory.fail_next(3);
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        assert!(eventually(Duration::from_secs(30), || published(&registry).len() == 1).await);
        let attempts = factory.attempts();
        assert_eq!(attempts.len(), 4);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
        assert_eq!(sup.state(), ConnectionState::Connected);
        sup.stop();
        sup.terminated().await;
    }

    #[tokio::test]
    async fn test_client_id_precedes_fault_handler_and_start() {
        let factory = MockFactory::new();
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(Some(Credentials::new("app", "secret")), Some("client-1".into()))
            .unwrap();

        assert!(eventually(Duration::from_secs(5), || {
            factory.last().is_some_and(|c| c.ops().contains(&"start"))
        })
        .await);
        let conn = factory.last().unwrap();
        assert_eq!(conn.ops()[..3], ["client_id", "fault_handler", "start"]);
        assert_eq!(conn.client_id.lock().as_deref(), Some("client-1"));
        assert_eq!(
            factory.credentials()[0].as_ref().and_then(|c| c.username.clone()),
            Some("app".to_string())
        );
        sup.stop();
    }

    #[tokio::test]
    async fn test_stale_fault_does_not_unpublish_current() {
        let factory = MockFactory::new();
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        assert!(eventually(Duration::from_secs(5), || published(&registry).len() == 1).await);
        let a = factory.last().unwrap();

        a.fault("socket reset");
        assert!(eventually(Duration::from_secs(5), || {
            factory.connections().len() == 2 && published(&registry).len() == 1
        })
        .await);
        let current = published(&registry)[0].id();

        a.fault("late duplicate");
        let still = published(&registry);
        assert_eq!(still.len(), 1);
        assert_eq!(still[0].id(), current);
        assert_eq!(factory.connections().len(), 2);
        assert!(eventually(Duration::from_secs(5), || a.is_closed()).await);

        sup.stop();
        sup.terminated().await;
    }

    #[tokio::test]
    async fn test_stop_unpublishes_then_stops_and_closes() {
        let factory = MockFactory::new();
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();
        assert!(eventually(Duration::from_secs(5), || published(&registry).len() == 1).await);

        let conn = factory.last().unwrap();
        conn.fail_stop.store(true, Ordering::SeqCst);
        sup.stop();
        assert!(published(&registry).is_empty());
        sup.terminated().await;

        let ops = conn.ops();
        let stop = ops.iter().position(|o| *o == "stop").unwrap();
        let close = ops.iter().position(|o| *o == "close").unwrap();
        assert!(stop < close);
        assert!(conn.is_closed());

        // faults after stop are ignored
        conn.fault("late");
        assert_eq!(factory.connections().len(), 1);
        assert!(matches!(
            sup.start(None, None),
            Err(LifecycleError::ShutdownInProgress { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_backoff() {
        let factory = MockFactory::new();
        factory.fail_next(100);
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        assert!(eventually(Duration::from_secs(1), || factory.attempts().len() == 1).await);
        sup.stop();
        sup.terminated().await;

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(factory.attempts().len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_assigning_client_id_closes_connection() {
        let factory = MockFactory::new();
        *factory.client_id_delay.lock() = Some(Duration::from_secs(10));
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, Some("cid".into())).unwrap();

        assert!(eventually(Duration::from_secs(1), || factory.last().is_some()).await);
        time::sleep(Duration::from_secs(1)).await;
        sup.stop();
        sup.terminated().await;

        let conn = factory.last().unwrap();
        assert!(conn.is_closed());
        assert_eq!(conn.ops(), ["client_id", "stop", "close"]);
        assert!(registry.is_empty());
        assert_eq!(factory.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_before_publication_retries_with_fresh_connection() {
        let factory = MockFactory::new();
        factory.fault_on_install.store(true, Ordering::SeqCst);
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        assert!(eventually(Duration::from_secs(30), || published(&registry).len() == 1).await);
        let connections = factory.connections();
        assert_eq!(connections.len(), 2);
        assert!(eventually(Duration::from_secs(1), || connections[0].is_closed()).await);
        assert!(!connections[0].ops().contains(&"start"));
        let current = sup.current().unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(&current), Arc::as_ptr(&connections[1])));
        sup.stop();
        sup.terminated().await;
    }

    #[tokio::test]
    async fn test_start_failure_takes_fault_path() {
        let factory = MockFactory::new();
        factory.fail_start.store(true, Ordering::SeqCst);
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        sup.start(None, None).unwrap();

        assert!(eventually(Duration::from_secs(5), || factory.connections().len() >= 2).await);
        factory.fail_start.store(false, Ordering::SeqCst);
        assert!(eventually(Duration::from_secs(5), || {
            factory
                .last()
                .is_some_and(|c| c.ops().contains(&"start") && !c.is_closed())
                && published(&registry).len() == 1
        })
        .await);
        assert!(factory.connections()[0].is_closed());
        sup.stop();
        sup.terminated().await;
    }

    #[tokio::test]
    async fn test_single_loop_under_repeated_start() {
        let factory = MockFactory::new();
        let registry = Registry::new();
        let sup = supervisor(&factory, &registry);
        for _ in 0..5 {
            sup.start(None, None).unwrap();
        }
        assert!(eventually(Duration::from_secs(5), || published(&registry).len() == 1).await);
        tokio::task::yield_now().await;
        assert_eq!(factory.connections().len(), 1);
        sup.stop();
    }
}
