//! # Derived connection factories.
//!
//! - [`FactoryConfigManager`] turns configurations into published connection factories.
//! - [`ConnectionFactoryFactory`] and [`PooledConnectionFactoryFactory`] are the
//!   capabilities a factory is derived from; [`PoolingWrapper`] composes them.
//! - [`ExternalConfigLoader`] replaces `NAME(argument)` values through the
//!   matching [`ConfigLoader`] before anything else looks at a configuration.
//! - [`Decryptor`] resolves `ENC(...)` values through a [`StringEncryptor`].

mod decrypt;
mod external;
mod manager;
mod pooling;

pub use decrypt::{ALIAS_KEY, DECRYPTOR_KEY, Decryptor, STRING_ENCRYPTOR_TYPE, StringEncryptor, ciphertext};
pub use external::{
    CONFIG_LOADER_TYPE, ConfigLoader, ExternalConfigLoader, FileConfigLoader, external_reference,
};
pub use manager::{
    CONNECTION_FACTORY_TYPE_KEY, FACTORY_TYPE_KEY, FactoryConfigManager, JNDI_NAME_KEY,
    MANAGED_KEY, NAME_KEY, POOL_KEY, XA_KEY,
};
pub use pooling::{
    CONNECTION_FACTORY_FACTORY_TYPE, ConnectionFactoryFactory, FactoryKind,
    POOLED_CONNECTION_FACTORY_FACTORY_TYPE, PooledConnectionFactoryFactory, PoolingWrapper,
};
