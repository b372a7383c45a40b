//! Factory-factory capabilities and their pooled composition.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{LifecycleError, ProviderError};
use crate::properties::Properties;
use crate::provider::{CONNECTION_FACTORY_TYPE, ConnectionFactory, XA_CONNECTION_FACTORY_TYPE};

/// Registry type tag of [`ConnectionFactoryFactory`] providers.
pub const CONNECTION_FACTORY_FACTORY_TYPE: &str = "ConnectionFactoryFactory";
/// Registry type tag of [`PooledConnectionFactoryFactory`] providers.
pub const POOLED_CONNECTION_FACTORY_FACTORY_TYPE: &str = "PooledConnectionFactoryFactory";

/// Flavor of connection factory a configuration asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FactoryKind {
    #[default]
    Plain,
    Xa,
}

impl FactoryKind {
    /// Registry type tag the derived factory is published under.
    pub fn type_tag(self) -> &'static str {
        match self {
            FactoryKind::Plain => CONNECTION_FACTORY_TYPE,
            FactoryKind::Xa => XA_CONNECTION_FACTORY_TYPE,
        }
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

impl FromStr for FactoryKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            CONNECTION_FACTORY_TYPE => Ok(FactoryKind::Plain),
            XA_CONNECTION_FACTORY_TYPE => Ok(FactoryKind::Xa),
            other => Err(LifecycleError::config(format!(
                "unknown connection factory type '{other}'"
            ))),
        }
    }
}

/// Creates broker-specific connection factories from forwarded properties.
pub trait ConnectionFactoryFactory: Send + Sync + 'static {
    fn create_connection_factory(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError>;

    fn create_xa_connection_factory(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError>;

    /// Dispatches on `kind`.
    fn create(
        &self,
        kind: FactoryKind,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        match kind {
            FactoryKind::Plain => self.create_connection_factory(properties),
            FactoryKind::Xa => self.create_xa_connection_factory(properties),
        }
    }
}

/// Wraps factories produced by a base [`ConnectionFactoryFactory`] in a pool.
pub trait PooledConnectionFactoryFactory: Send + Sync + 'static {
    fn create(
        &self,
        base: Arc<dyn ConnectionFactoryFactory>,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError>;
}

/// A [`ConnectionFactoryFactory`] whose plain factories come out pooled.
///
/// XA factories are delegated to the base factory factory unchanged.
pub struct PoolingWrapper {
    pooled: Arc<dyn PooledConnectionFactoryFactory>,
    base: Arc<dyn ConnectionFactoryFactory>,
}

impl PoolingWrapper {
    pub fn new(
        pooled: Arc<dyn PooledConnectionFactoryFactory>,
        base: Arc<dyn ConnectionFactoryFactory>,
    ) -> Self {
        Self { pooled, base }
    }
}

impl ConnectionFactoryFactory for PoolingWrapper {
    fn create_connection_factory(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        self.pooled.create(Arc::clone(&self.base), properties)
    }

    fn create_xa_connection_factory(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ConnectionFactory>, ProviderError> {
        self.base.create_xa_connection_factory(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFactoryFactory, MockPool};

    #[test]
    fn test_kind_parsing() {
        assert_eq!("ConnectionFactory".parse::<FactoryKind>().unwrap(), FactoryKind::Plain);
        assert_eq!(" XAConnectionFactory ".parse::<FactoryKind>().unwrap(), FactoryKind::Xa);
        let err = "QueueConnectionFactory".parse::<FactoryKind>().unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_configuration");
        assert_eq!(FactoryKind::Xa.type_tag(), XA_CONNECTION_FACTORY_TYPE);
    }

    #[test]
    fn test_wrapper_pools_plain_and_delegates_xa() {
        let base = MockFactoryFactory::new();
        let pool = MockPool::new();
        let wrapper = PoolingWrapper::new(pool.clone(), base.clone());
        let props = Properties::new().with("url", "tcp://broker");

        wrapper.create(FactoryKind::Plain, &props).unwrap();
        assert_eq!(pool.wrapped(), 1);
        assert_eq!(base.requests(), vec![(FactoryKind::Plain, props.clone())]);

        wrapper.create(FactoryKind::Xa, &props).unwrap();
        assert_eq!(pool.wrapped(), 1);
        assert_eq!(base.requests()[1], (FactoryKind::Xa, props));
    }
}
