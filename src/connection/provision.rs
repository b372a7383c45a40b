//! # Registry-driven connection provisioning.
//!
//! [`supervise`] ties a [`ConnectionSupervisor`] to the presence of a
//! [`ConnectionFactory`] in the registry: a one-link [`DependencyChain`] starts a
//! supervisor when a matching factory appears and stops it when that factory goes.

use std::sync::Arc;

use async_trait::async_trait;

use super::supervisor::ConnectionSupervisor;
use crate::chain::{Assembly, CapabilityRequirement, DependencyChain, Links};
use crate::config::Config;
use crate::error::{LifecycleError, ProviderError};
use crate::events::Bus;
use crate::properties::Properties;
use crate::provider::{CONNECTION_FACTORY_TYPE, ConnectionFactory, Credentials};
use crate::registry::Registry;

/// Property key of the connection user name.
pub const USERNAME_KEY: &str = "connvisor.username";
/// Property key of the connection password (usually hidden as `.connvisor.password`).
pub const PASSWORD_KEY: &str = "connvisor.password";
/// Property key of the client identifier.
pub const CLIENT_ID_KEY: &str = "connvisor.clientid";
/// Property key naming the connection.
pub const NAME_KEY: &str = "name";

/// Settings of one supervised connection, read from a property map.
#[derive(Clone, Debug, Default)]
pub struct ConnectionSettings {
    pub name: String,
    pub credentials: Option<Credentials>,
    pub client_id: Option<String>,
    /// Properties the connection is published with.
    pub service_properties: Properties,
}

impl ConnectionSettings {
    /// Reads credentials and client id; publishes everything else that is not
    /// hidden and not a credential.
    pub fn from_properties(props: &Properties) -> Self {
        let username = props.get_visible_or_hidden(USERNAME_KEY).map(str::to_string);
        let password = props.get_visible_or_hidden(PASSWORD_KEY).map(str::to_string);
        let credentials = (username.is_some() || password.is_some())
            .then_some(Credentials { username, password });

        Self {
            name: props
                .get_trimmed(NAME_KEY)
                .unwrap_or("connection")
                .to_string(),
            credentials,
            client_id: props.get_trimmed(CLIENT_ID_KEY).map(str::to_string),
            service_properties: props.public_view(&[USERNAME_KEY, PASSWORD_KEY]),
        }
    }
}

struct SupervisorAssembly {
    registry: Arc<Registry>,
    bus: Bus,
    config: Config,
    settings: ConnectionSettings,
}

#[async_trait]
impl Assembly for SupervisorAssembly {
    type Output = ConnectionSupervisor;

    async fn build(&self, links: &Links) -> Result<ConnectionSupervisor, ProviderError> {
        let factory = links.object::<dyn ConnectionFactory>(0)?;
        let supervisor = ConnectionSupervisor::new(
            self.settings.name.as_str(),
            factory,
            Arc::clone(&self.registry),
            self.settings.service_properties.clone(),
        )
        .map_err(|e| ProviderError::construction(e.as_message()))?
        .with_bus(self.bus.clone())
        .with_backoff(self.config.backoff);

        supervisor
            .start(
                self.settings.credentials.clone(),
                self.settings.client_id.clone(),
            )
            .map_err(|e| ProviderError::construction(e.as_message()))?;
        Ok(supervisor)
    }

    async fn destroy(&self, supervisor: ConnectionSupervisor) {
        supervisor.stop();
        supervisor.terminated().await;
    }
}

/// Supervises a connection for as long as a factory matching `factory_filter` exists.
///
/// `factory_filter` is a textual filter over the factory's properties (`None`
/// accepts any factory). Settings are read from `properties` as described in
/// [`ConnectionSettings::from_properties`].
pub fn supervise(
    registry: &Arc<Registry>,
    bus: Bus,
    config: Config,
    factory_filter: Option<&str>,
    properties: &Properties,
) -> Result<DependencyChain, LifecycleError> {
    let settings = ConnectionSettings::from_properties(properties);
    let requirement = match factory_filter {
        Some(expr) => CapabilityRequirement::filtered(CONNECTION_FACTORY_TYPE, expr),
        None => CapabilityRequirement::of(CONNECTION_FACTORY_TYPE),
    };
    let name = format!("connection:{}", settings.name);
    let assembly = SupervisorAssembly {
        registry: Arc::clone(registry),
        bus: bus.clone(),
        config,
        settings,
    };
    DependencyChain::activate(registry, bus, name, vec![requirement], assembly)
}
