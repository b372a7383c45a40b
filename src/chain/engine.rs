//! # Dependency chain engine.
//!
//! A [`DependencyChain`] keeps one derived resource alive exactly while every
//! [`CapabilityRequirement`] resolves to at least one provider in the [`Registry`].
//!
//! ## Architecture
//! ```text
//! Registry watcher #0 ──┐
//! Registry watcher #1 ──┼──► mpsc (unbounded) ──► ChainActor ──► Assembly::build / destroy
//! Registry watcher #N ──┘           ▲                  │
//!                                   │                  └──► watch<ChainStatus>, Bus events
//! DependencyChain::{settle, deactivate}
//! ```
//!
//! ## Rules
//! - Registry callbacks only enqueue; the actor is the single owner of the built
//!   resource and the only caller of `build`/`destroy`, so build/destroy pairs of
//!   one chain never overlap and no lock is held while they run.
//! - Each link binds its best provider (highest ranking, then most recent).
//! - Only the removal of a *bound* provider destroys the resource; the chain then
//!   rebuilds at once if every link still resolves.
//! - A failed build leaves the chain unbuilt until the next provider change.
//! - `deactivate` stops rebuilds, waits for any in-flight build, and destroys the
//!   resource exactly once. It is idempotent.
//!
//! Registry notifications are processed asynchronously: use [`DependencyChain::settle`]
//! to wait until every notification delivered so far has been applied.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::assembly::{Assembly, Links};
use super::requirement::CapabilityRequirement;
use crate::error::LifecycleError;
use crate::events::{Bus, Event, EventKind};
use crate::registry::{ProviderId, ProviderRef, Registry, RegistryEvent, RegistryListener, Subscription};

/// Observable state of a chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainStatus {
    /// A derived resource currently exists.
    pub built: bool,
    /// Number of successful builds so far.
    pub generation: u64,
    /// Providers bound into the current resource, in link order (empty when unbuilt).
    pub bound: Vec<ProviderId>,
}

enum Command {
    Added(usize, ProviderRef),
    Removed(usize, ProviderRef),
    Snapshot(usize, Vec<ProviderRef>),
    Settle(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to an active dependency chain.
pub struct DependencyChain {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChainStatus>,
    subscriptions: Mutex<Vec<Subscription>>,
    token: CancellationToken,
    actor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DependencyChain {
    /// Starts watching the registry for every requirement.
    ///
    /// Nothing is built until each requirement has a matching provider.
    ///
    /// ### Errors
    /// [`LifecycleError::Configuration`] when `requirements` is empty, a filter is
    /// malformed, or no Tokio runtime is available.
    pub fn activate<A: Assembly>(
        registry: &Arc<Registry>,
        bus: Bus,
        name: impl Into<Arc<str>>,
        requirements: Vec<CapabilityRequirement>,
        assembly: A,
    ) -> Result<Self, LifecycleError> {
        let name = name.into();
        if requirements.is_empty() {
            return Err(LifecycleError::config(format!(
                "chain '{name}' has no requirements"
            )));
        }
        let filters = requirements
            .iter()
            .map(CapabilityRequirement::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        let runtime = Handle::try_current()
            .map_err(|_| LifecycleError::config("chain activation requires a Tokio runtime"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChainStatus::default());
        let token = CancellationToken::new();

        let actor = ChainActor {
            name: Arc::clone(&name),
            assembly,
            slots: (0..filters.len()).map(|_| Slot::default()).collect(),
            built: None,
            generation: 0,
            status: status_tx,
            bus: bus.clone(),
            token: token.clone(),
        };
        let join = runtime.spawn(actor.run(rx));

        let mut subscriptions = Vec::with_capacity(filters.len());
        for (index, filter) in filters.into_iter().enumerate() {
            let sink = tx.clone();
            let listener: RegistryListener = Arc::new(move |ev: &RegistryEvent| {
                let cmd = match ev {
                    RegistryEvent::Added(p) => Command::Added(index, p.clone()),
                    RegistryEvent::Removed(p) => Command::Removed(index, p.clone()),
                };
                let _ = sink.send(cmd);
            });
            let (subscription, snapshot) = registry.subscribe(filter, listener);
            let _ = tx.send(Command::Snapshot(index, snapshot));
            subscriptions.push(subscription);
        }

        debug!(chain = %name, links = requirements.len(), "chain activated");
        bus.publish(Event::new(EventKind::ChainActivated).with_subject(Arc::clone(&name)));

        Ok(Self {
            name,
            tx,
            status: status_rx,
            subscriptions: Mutex::new(subscriptions),
            token,
            actor: tokio::sync::Mutex::new(Some(join)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status snapshot.
    pub fn status(&self) -> ChainStatus {
        self.status.borrow().clone()
    }

    /// True if the derived resource currently exists.
    pub fn is_built(&self) -> bool {
        self.status.borrow().built
    }

    /// Receiver that observes every status change.
    pub fn watch(&self) -> watch::Receiver<ChainStatus> {
        self.status.clone()
    }

    /// Waits until all registry notifications delivered before this call are applied.
    pub async fn settle(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Settle(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Stops watching and destroys the resource if built.
    ///
    /// Returns once destroy has completed. Concurrent and repeated calls are
    /// no-ops that wait for the first one.
    pub async fn deactivate(&self) {
        let mut actor = self.actor.lock().await;
        let Some(join) = actor.take() else {
            return;
        };

        self.token.cancel();
        self.subscriptions.lock().clear();

        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }
        if let Err(e) = join.await {
            error!(chain = %self.name, error = %e, "chain actor terminated abnormally");
        }
    }
}

impl fmt::Debug for DependencyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyChain")
            .field("name", &self.name)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// Candidates for one link.
#[derive(Default)]
struct Slot {
    candidates: BTreeMap<ProviderId, ProviderRef>,
    /// Snapshot applied; removals of unknown ids can be ignored from now on.
    synced: bool,
    /// Removals that overtook the snapshot.
    early_removals: HashSet<ProviderId>,
}

impl Slot {
    fn best(&self) -> Option<&ProviderRef> {
        self.candidates
            .values()
            .reduce(|best, p| if p.outranks(best) { p } else { best })
    }
}

struct Built<T> {
    output: T,
    bound: Vec<ProviderId>,
}

struct ChainActor<A: Assembly> {
    name: Arc<str>,
    assembly: A,
    slots: Vec<Slot>,
    built: Option<Built<A::Output>>,
    generation: u64,
    status: watch::Sender<ChainStatus>,
    bus: Bus,
    token: CancellationToken,
}

impl<A: Assembly> ChainActor<A> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Added(index, provider) => {
                    self.slots[index].candidates.insert(provider.id(), provider);
                    self.reconcile().await;
                }
                Command::Removed(index, provider) => {
                    let id = provider.id();
                    let slot = &mut self.slots[index];
                    if slot.candidates.remove(&id).is_none() && !slot.synced {
                        slot.early_removals.insert(id);
                    }
                    if self.is_bound(index, id) {
                        self.teardown("provider removed").await;
                    }
                    self.reconcile().await;
                }
                Command::Snapshot(index, providers) => {
                    let slot = &mut self.slots[index];
                    for provider in providers {
                        if !slot.early_removals.contains(&provider.id()) {
                            slot.candidates.insert(provider.id(), provider);
                        }
                    }
                    slot.early_removals.clear();
                    slot.synced = true;
                    self.reconcile().await;
                }
                Command::Settle(ack) => {
                    let _ = ack.send(());
                }
                Command::Shutdown(ack) => {
                    self.teardown("deactivated").await;
                    self.finish();
                    let _ = ack.send(());
                    return;
                }
            }
        }
        self.teardown("chain dropped").await;
        self.finish();
    }

    fn is_bound(&self, index: usize, id: ProviderId) -> bool {
        self.built
            .as_ref()
            .is_some_and(|b| b.bound.get(index) == Some(&id))
    }

    /// Builds when every link resolves and nothing is built yet.
    async fn reconcile(&mut self) {
        if self.built.is_some() || self.token.is_cancelled() {
            return;
        }
        let Some(providers) = self
            .slots
            .iter()
            .map(|s| s.best().cloned())
            .collect::<Option<Vec<_>>>()
        else {
            return;
        };

        let links = Links::new(providers);
        let bound = links.ids();
        match self.assembly.build(&links).await {
            Ok(output) => {
                self.generation += 1;
                info!(chain = %self.name, generation = self.generation, ?bound, "chain resource built");
                self.bus.publish(
                    Event::new(EventKind::ChainBuilt)
                        .with_subject(Arc::clone(&self.name))
                        .with_attempt(u32::try_from(self.generation).unwrap_or(u32::MAX)),
                );
                self.built = Some(Built { output, bound });
                self.publish_status();
            }
            Err(e) => {
                warn!(chain = %self.name, error = %e, "chain build failed");
                self.bus.publish(
                    Event::new(EventKind::ChainBuildFailed)
                        .with_subject(Arc::clone(&self.name))
                        .with_reason(e.as_message()),
                );
            }
        }
    }

    async fn teardown(&mut self, reason: &'static str) {
        let Some(built) = self.built.take() else {
            return;
        };
        self.assembly.destroy(built.output).await;
        info!(chain = %self.name, generation = self.generation, reason, "chain resource destroyed");
        self.bus.publish(
            Event::new(EventKind::ChainDestroyed)
                .with_subject(Arc::clone(&self.name))
                .with_reason(reason),
        );
        self.publish_status();
    }

    fn finish(&self) {
        debug!(chain = %self.name, "chain deactivated");
        self.bus
            .publish(Event::new(EventKind::ChainDeactivated).with_subject(Arc::clone(&self.name)));
    }

    fn publish_status(&self) {
        let status = ChainStatus {
            built: self.built.is_some(),
            generation: self.generation,
            bound: self
                .built
                .as_ref()
                .map(|b| b.bound.clone())
                .unwrap_or_default(),
        };
        self.status.send_replace(status);
    }
}
