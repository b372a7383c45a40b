//! # In-process capability registry.
//!
//! The [`Registry`] is an observable directory of published capability providers.
//! Providers are published under a type tag with a property map; watchers
//! subscribe with a [`Filter`] and are told when matching providers appear or
//! disappear.
//!
//! ## Architecture
//! ```text
//! publish(tag, Arc<T>, props) ──► lock ──► insert ProviderRef ──► copy matching listeners ──► unlock
//!                                                                         │
//!                                                                         ▼
//!                                                         listener(RegistryEvent::Added(..))
//! ```
//!
//! ## Rules
//! - Listeners are invoked **after** the directory lock is released (copy-then-notify),
//!   so a listener may publish, unpublish or subscribe without deadlocking.
//! - Provider ids are never reused; a republished resource gets a fresh id.
//! - `subscribe` registers the listener and snapshots current matches atomically.
//!   A removal racing with the snapshot may reach the listener before the
//!   caller has consumed the snapshot; consumers must tolerate that order.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::filter::Filter;
use crate::properties::{ID_KEY, Properties, RANKING_KEY, TYPE_KEY};

/// Registry-assigned provider identity (monotonic, never reused).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(pub u64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle on a published provider.
#[derive(Clone)]
pub struct ProviderRef {
    id: ProviderId,
    type_tag: Arc<str>,
    ranking: i64,
    properties: Arc<Properties>,
    object: Arc<dyn Any + Send + Sync>,
}

impl ProviderRef {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn ranking(&self) -> i64 {
        self.ranking
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns the published resource if it was published as `Arc<T>`.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.object.downcast_ref::<Arc<T>>().cloned()
    }

    /// Ordering key: higher ranking first, then most recently published first.
    fn precedence(&self) -> (i64, ProviderId) {
        (self.ranking, self.id)
    }

    /// True if `self` should be preferred over `other`.
    pub fn outranks(&self, other: &ProviderRef) -> bool {
        self.precedence() > other.precedence()
    }
}

impl fmt::Debug for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRef")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("ranking", &self.ranking)
            .finish_non_exhaustive()
    }
}

/// Notification delivered to registry listeners.
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    Added(ProviderRef),
    Removed(ProviderRef),
}

impl RegistryEvent {
    pub fn provider(&self) -> &ProviderRef {
        match self {
            RegistryEvent::Added(p) | RegistryEvent::Removed(p) => p,
        }
    }
}

/// Callback invoked for matching registry events.
pub type RegistryListener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

struct Watcher {
    id: u64,
    filter: Filter,
    listener: RegistryListener,
}

#[derive(Default)]
struct Directory {
    next_provider: u64,
    next_watcher: u64,
    providers: BTreeMap<ProviderId, ProviderRef>,
    watchers: Vec<Watcher>,
}

impl Directory {
    fn listeners_for(&self, props: &Properties) -> Vec<RegistryListener> {
        self.watchers
            .iter()
            .filter(|w| w.filter.matches(props))
            .map(|w| Arc::clone(&w.listener))
            .collect()
    }
}

/// Observable directory of capability providers.
pub struct Registry {
    inner: Mutex<Directory>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Directory::default()),
        })
    }

    /// Publishes `resource` under `type_tag`.
    ///
    /// `objectClass`, `service.id` and (when absent) `service.ranking` are
    /// written into the stored properties. The returned [`Registration`]
    /// unpublishes on [`Registration::unpublish`] or drop.
    pub fn publish<T>(self: &Arc<Self>, type_tag: &str, resource: Arc<T>, properties: Properties) -> Registration
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut properties = properties;
        properties.insert(TYPE_KEY, type_tag);
        let ranking = properties
            .get_trimmed(RANKING_KEY)
            .and_then(|r| r.parse::<i64>().ok())
            .unwrap_or(0);

        let (provider, listeners) = {
            let mut dir = self.inner.lock();
            dir.next_provider += 1;
            let id = ProviderId(dir.next_provider);
            properties.insert(ID_KEY, id.0.to_string());

            let provider = ProviderRef {
                id,
                type_tag: Arc::from(type_tag),
                ranking,
                properties: Arc::new(properties),
                object: Arc::new(resource),
            };
            dir.providers.insert(id, provider.clone());
            let listeners = dir.listeners_for(provider.properties());
            (provider, listeners)
        };

        debug!(id = %provider.id, type_tag, ranking, "provider published");
        let event = RegistryEvent::Added(provider.clone());
        for listener in listeners {
            listener(&event);
        }

        Registration {
            registry: Arc::downgrade(self),
            id: provider.id,
            done: false,
        }
    }

    /// Removes a provider; no-op if already gone.
    fn unpublish(&self, id: ProviderId) {
        let removed = {
            let mut dir = self.inner.lock();
            dir.providers.remove(&id).map(|p| {
                let listeners = dir.listeners_for(p.properties());
                (p, listeners)
            })
        };

        if let Some((provider, listeners)) = removed {
            debug!(id = %provider.id, type_tag = provider.type_tag(), "provider unpublished");
            let event = RegistryEvent::Removed(provider);
            for listener in listeners {
                listener(&event);
            }
        }
    }

    /// Providers published under `type_tag` that match `filter`, best first.
    pub fn find_providers(&self, type_tag: &str, filter: &Filter) -> Vec<ProviderRef> {
        let dir = self.inner.lock();
        let mut found: Vec<ProviderRef> = dir
            .providers
            .values()
            .filter(|p| p.type_tag() == type_tag && filter.matches(p.properties()))
            .cloned()
            .collect();
        found.sort_unstable_by(|a, b| b.precedence().cmp(&a.precedence()));
        found
    }

    /// Looks up a provider by id.
    pub fn get(&self, id: ProviderId) -> Option<ProviderRef> {
        self.inner.lock().providers.get(&id).cloned()
    }

    /// Watches providers matching `filter`.
    ///
    /// Returns the subscription handle and the providers that matched at the
    /// moment the listener was installed (oldest first). The listener is not
    /// invoked for that snapshot.
    pub fn subscribe(
        self: &Arc<Self>,
        filter: Filter,
        listener: RegistryListener,
    ) -> (Subscription, Vec<ProviderRef>) {
        let mut dir = self.inner.lock();
        dir.next_watcher += 1;
        let id = dir.next_watcher;
        let snapshot = dir
            .providers
            .values()
            .filter(|p| filter.matches(p.properties()))
            .cloned()
            .collect();
        dir.watchers.push(Watcher {
            id,
            filter,
            listener,
        });

        (
            Subscription {
                registry: Arc::downgrade(self),
                id,
            },
            snapshot,
        )
    }

    fn unsubscribe(&self, watcher: u64) {
        self.inner.lock().watchers.retain(|w| w.id != watcher);
    }

    /// Number of currently published providers.
    pub fn len(&self) -> usize {
        self.inner.lock().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one publication; unpublishes on drop.
pub struct Registration {
    registry: Weak<Registry>,
    id: ProviderId,
    done: bool,
}

impl Registration {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Withdraws the provider. Idempotent.
    pub fn unpublish(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unpublish(self.id);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.unpublish();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("done", &self.done)
            .finish()
    }
}

/// Handle to one watcher; stops delivery on drop.
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    /// Stops delivery. Events already being dispatched may still arrive.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}
