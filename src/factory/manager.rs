//! # Configuration-driven connection factories.
//!
//! External references (`FILE(path)` and other [`ConfigLoader`](super::ConfigLoader)
//! prefixes) are resolved once per update, before the configuration is validated.
//! Each configuration pid owns one [`DependencyChain`]. The chain waits for the
//! capabilities the configuration names and publishes the resulting factory:
//!
//! ```text
//! [StringEncryptor (alias)]?  [PooledConnectionFactoryFactory (pool, xa)]?  ConnectionFactoryFactory (type)
//!            \                              |                                   /
//!             +------------------ build: decrypt, create, publish -------------+
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use super::decrypt::{ALIAS_KEY, Decryptor, STRING_ENCRYPTOR_TYPE, StringEncryptor};
use super::external::ExternalConfigLoader;
use super::pooling::{
    CONNECTION_FACTORY_FACTORY_TYPE, ConnectionFactoryFactory, FactoryKind,
    POOLED_CONNECTION_FACTORY_FACTORY_TYPE, PooledConnectionFactoryFactory, PoolingWrapper,
};
use crate::chain::{Assembly, CapabilityRequirement, DependencyChain, Links};
use crate::error::{LifecycleError, ProviderError};
use crate::events::Bus;
use crate::properties::Properties;
use crate::provider::ConnectionFactory;
use crate::registry::{Filter, Registration, Registry};

/// Configuration key selecting the base factory factory by its `type` property.
pub const FACTORY_TYPE_KEY: &str = "type";
/// Configuration key selecting a pooling implementation.
pub const POOL_KEY: &str = "pool";
/// Configuration key asking the pool for XA support (`true`/`false`).
pub const XA_KEY: &str = "xa";
/// Configuration key choosing the published factory flavor.
pub const CONNECTION_FACTORY_TYPE_KEY: &str = "connectionFactoryType";
/// Name the factory is published under.
pub const JNDI_NAME_KEY: &str = "osgi.jndi.service.name";
/// Fallback for [`JNDI_NAME_KEY`].
pub const NAME_KEY: &str = "name";
/// Marker property set on every factory published by a [`FactoryConfigManager`].
pub const MANAGED_KEY: &str = "connvisor.managed";

/// What one configuration asks for, validated.
#[derive(Debug)]
struct FactoryPlan {
    pid: String,
    kind: FactoryKind,
    provider_type: String,
    jndi_name: String,
    pool: Option<String>,
    xa: bool,
    encrypted: bool,
    alias: Option<String>,
    config: Properties,
}

impl FactoryPlan {
    fn from_config(pid: &str, mut config: Properties) -> Result<Self, LifecycleError> {
        let provider_type = config
            .get_trimmed(FACTORY_TYPE_KEY)
            .ok_or_else(|| {
                LifecycleError::config(format!(
                    "configuration '{pid}' has no '{FACTORY_TYPE_KEY}' key"
                ))
            })?
            .to_string();

        let kind = match config.get_trimmed(CONNECTION_FACTORY_TYPE_KEY) {
            Some(value) => value.parse()?,
            None => FactoryKind::Plain,
        };

        let pool = config
            .remove(POOL_KEY)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let xa = match config.remove(XA_KEY).as_deref().map(str::trim) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(LifecycleError::config(format!(
                    "invalid '{XA_KEY}' value '{other}' in '{pid}', expected true or false"
                )));
            }
        };
        if xa && pool.is_none() {
            return Err(LifecycleError::config(format!(
                "'{XA_KEY}' requires '{POOL_KEY}' in '{pid}'"
            )));
        }

        let jndi_name = config
            .get_trimmed(JNDI_NAME_KEY)
            .or_else(|| config.get_trimmed(NAME_KEY))
            .ok_or_else(|| {
                LifecycleError::config(format!(
                    "configuration '{pid}' names no factory (set '{JNDI_NAME_KEY}' or '{NAME_KEY}')"
                ))
            })?
            .to_string();
        config.insert(JNDI_NAME_KEY, jndi_name.as_str());

        Ok(Self {
            pid: pid.to_string(),
            kind,
            provider_type,
            jndi_name,
            pool,
            xa,
            encrypted: Decryptor::is_encrypted(&config),
            alias: Decryptor::alias(&config).map(str::to_string),
            config,
        })
    }

    /// Chain links in build order: encryptor, pool, base factory factory.
    fn requirements(&self) -> Vec<CapabilityRequirement> {
        let mut reqs = Vec::with_capacity(3);
        if self.encrypted {
            let filter = match &self.alias {
                Some(alias) => Filter::eq(ALIAS_KEY, alias.as_str()),
                None => Filter::any(),
            };
            reqs.push(CapabilityRequirement::matching(STRING_ENCRYPTOR_TYPE, filter));
        }
        if let Some(pool) = &self.pool {
            reqs.push(CapabilityRequirement::matching(
                POOLED_CONNECTION_FACTORY_FACTORY_TYPE,
                Filter::eq(POOL_KEY, pool.as_str()).and(XA_KEY, self.xa.to_string()),
            ));
        }
        reqs.push(CapabilityRequirement::matching(
            CONNECTION_FACTORY_FACTORY_TYPE,
            Filter::eq(FACTORY_TYPE_KEY, self.provider_type.as_str()),
        ));
        reqs
    }

    fn service_properties(&self) -> Properties {
        self.config.public_view(&[]).with(MANAGED_KEY, "true")
    }
}

/// A derived factory while it is published.
struct ManagedFactory {
    factory: Arc<dyn ConnectionFactory>,
    registration: Registration,
}

struct FactoryAssembly {
    registry: Arc<Registry>,
    plan: FactoryPlan,
}

#[async_trait]
impl Assembly for FactoryAssembly {
    type Output = ManagedFactory;

    async fn build(&self, links: &Links) -> Result<ManagedFactory, ProviderError> {
        let plan = &self.plan;
        let mut next = 0;
        let encryptor = if plan.encrypted {
            next += 1;
            Some(links.object::<dyn StringEncryptor>(next - 1)?)
        } else {
            None
        };
        let pooled = if plan.pool.is_some() {
            next += 1;
            Some(links.object::<dyn PooledConnectionFactoryFactory>(next - 1)?)
        } else {
            None
        };
        let base = links.object::<dyn ConnectionFactoryFactory>(next)?;
        let factory_factory: Arc<dyn ConnectionFactoryFactory> = match pooled {
            Some(pooled) => Arc::new(PoolingWrapper::new(pooled, base)),
            None => base,
        };

        let decrypted = Decryptor::new(encryptor).decrypt(&plan.config)?;
        let factory = factory_factory.create(plan.kind, &decrypted.forwarded())?;

        info!(
            pid = %plan.pid,
            name = %plan.jndi_name,
            kind = %plan.kind,
            pooled = plan.pool.is_some(),
            "publishing connection factory"
        );
        let registration = self.registry.publish::<dyn ConnectionFactory>(
            plan.kind.type_tag(),
            Arc::clone(&factory),
            plan.service_properties(),
        );
        Ok(ManagedFactory {
            factory,
            registration,
        })
    }

    async fn destroy(&self, mut managed: ManagedFactory) {
        managed.registration.unpublish();
        if let Err(e) = managed.factory.close().await {
            warn!(pid = %self.plan.pid, error = %e, "error closing connection factory");
        }
    }
}

/// Keeps one derived connection factory per configuration pid.
///
/// Configurations arrive through [`FactoryConfigManager::updated`]; each one
/// replaces whatever the pid had before.
pub struct FactoryConfigManager {
    registry: Arc<Registry>,
    bus: Bus,
    chains: tokio::sync::Mutex<HashMap<String, DependencyChain>>,
    closed: AtomicBool,
}

impl FactoryConfigManager {
    pub fn new(registry: &Arc<Registry>, bus: Bus) -> Self {
        Self {
            registry: Arc::clone(registry),
            bus,
            chains: tokio::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Applies a new configuration for `pid`; `None` only removes the old one.
    ///
    /// ### Errors
    /// - [`LifecycleError::Configuration`] when the configuration is invalid; the
    ///   previous factory of `pid` is gone either way.
    /// - [`LifecycleError::ShutdownInProgress`] after [`FactoryConfigManager::close`].
    pub async fn updated(&self, pid: &str, config: Option<Properties>) -> Result<(), LifecycleError> {
        let mut chains = self.chains.lock().await;
        if let Some(previous) = chains.remove(pid) {
            previous.deactivate().await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(LifecycleError::ShutdownInProgress {
                component: "factory manager",
            });
        }
        let Some(config) = config else {
            return Ok(());
        };

        let config = ExternalConfigLoader::new(Arc::clone(&self.registry)).resolve(&config)?;
        let plan = FactoryPlan::from_config(pid, config)?;
        let requirements = plan.requirements();
        let assembly = FactoryAssembly {
            registry: Arc::clone(&self.registry),
            plan,
        };
        let chain = DependencyChain::activate(
            &self.registry,
            self.bus.clone(),
            format!("factory:{pid}"),
            requirements,
            assembly,
        )?;
        chains.insert(pid.to_string(), chain);
        Ok(())
    }

    /// Withdraws the factory of `pid`, if any.
    pub async fn deleted(&self, pid: &str) {
        let chain = self.chains.lock().await.remove(pid);
        if let Some(chain) = chain {
            chain.deactivate().await;
        }
    }

    /// Withdraws every factory and refuses further configurations.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let chains: Vec<_> = self.chains.lock().await.drain().map(|(_, c)| c).collect();
        for chain in chains {
            chain.deactivate().await;
        }
    }

    /// Pids with an active configuration, sorted.
    pub async fn pids(&self) -> Vec<String> {
        let mut pids: Vec<_> = self.chains.lock().await.keys().cloned().collect();
        pids.sort();
        pids
    }

    /// True if the factory of `pid` is currently published.
    pub async fn is_published(&self, pid: &str) -> bool {
        self.chains
            .lock()
            .await
            .get(pid)
            .is_some_and(DependencyChain::is_built)
    }

    /// Waits until every chain has processed the registry changes seen so far.
    pub async fn settle(&self) {
        let chains = self.chains.lock().await;
        for chain in chains.values() {
            chain.settle().await;
        }
    }
}
