//! Resolution of externally stored configuration values.
//!
//! A value of the form `NAME(argument)` is replaced by what the [`ConfigLoader`]
//! called `NAME` returns for `argument`. Loaders are looked up in the registry
//! under [`CONFIG_LOADER_TYPE`]; `FILE(path)` falls back to [`FileConfigLoader`]
//! when no registered loader claims it. Values naming no known loader, such as
//! `ENC(...)` or `host(port)`, are left untouched.

use std::sync::Arc;

use tracing::debug;

use crate::error::{LifecycleError, ProviderError};
use crate::properties::Properties;
use crate::registry::{Filter, Registry};

/// Registry type tag of [`ConfigLoader`] providers.
pub const CONFIG_LOADER_TYPE: &str = "ConfigLoader";

/// Produces a configuration value from a reference such as a file path.
pub trait ConfigLoader: Send + Sync + 'static {
    /// Prefix this loader answers to, e.g. `FILE`.
    fn name(&self) -> &str;

    fn resolve(&self, argument: &str) -> Result<String, ProviderError>;
}

/// Reads the value from a file; trailing line breaks are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileConfigLoader;

impl ConfigLoader for FileConfigLoader {
    fn name(&self) -> &str {
        "FILE"
    }

    fn resolve(&self, argument: &str) -> Result<String, ProviderError> {
        let content = std::fs::read_to_string(argument)
            .map_err(|e| ProviderError::construction(format!("cannot read '{argument}': {e}")))?;
        Ok(content.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Splits `NAME(argument)` into its loader name and argument.
///
/// The name must be non-empty and made of uppercase letters, digits or `_`.
pub fn external_reference(value: &str) -> Option<(&str, &str)> {
    let value = value.trim();
    let (name, rest) = value.split_once('(')?;
    let argument = rest.strip_suffix(')')?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    valid.then_some((name, argument))
}

/// Applies the loaders published in a registry to a property map.
pub struct ExternalConfigLoader {
    registry: Arc<Registry>,
}

impl ExternalConfigLoader {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    fn loader(&self, name: &str) -> Option<Arc<dyn ConfigLoader>> {
        let published = self
            .registry
            .find_providers(CONFIG_LOADER_TYPE, &Filter::any())
            .into_iter()
            .filter_map(|p| p.downcast::<dyn ConfigLoader>())
            .find(|l| l.name() == name);
        match published {
            Some(loader) => Some(loader),
            None if name == FileConfigLoader.name() => Some(Arc::new(FileConfigLoader)),
            None => None,
        }
    }

    /// Copy of `props` with every external reference resolved.
    ///
    /// ### Errors
    /// [`LifecycleError::Configuration`] when a loader fails on its argument.
    pub fn resolve(&self, props: &Properties) -> Result<Properties, LifecycleError> {
        let mut out = Properties::new();
        for (key, value) in props.iter() {
            let resolved = match external_reference(value)
                .and_then(|(name, argument)| self.loader(name).map(|l| (l, argument)))
            {
                Some((loader, argument)) => {
                    debug!(key, loader = loader.name(), "resolving external value");
                    loader.resolve(argument).map_err(|e| {
                        LifecycleError::config(format!("cannot resolve '{key}': {}", e.as_message()))
                    })?
                }
                None => value.to_string(),
            };
            out.insert(key, resolved);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoLoader;

    #[test]
    fn test_reference_form() {
        assert_eq!(external_reference("FILE(/run/secret)"), Some(("FILE", "/run/secret")));
        assert_eq!(external_reference(" CUSTOM_2() "), Some(("CUSTOM_2", "")));
        assert_eq!(external_reference("host1(port1),host2(port2)"), None);
        assert_eq!(external_reference("(x)"), None);
        assert_eq!(external_reference("FILE(x"), None);
        assert_eq!(external_reference("plain"), None);
    }

    #[test]
    fn test_plain_values_are_kept() {
        let props = Properties::new()
            .with("name", "testCF")
            .with("timeout", "2000")
            .with("connectionNameList", "host1(port1),host2(port2),host3(port3)")
            .with("password", "ENC(terces)");
        let resolved = ExternalConfigLoader::new(Registry::new()).resolve(&props).unwrap();
        assert_eq!(resolved, props);
    }

    #[test]
    fn test_file_reference_is_read() {
        let path = std::env::temp_dir().join(format!("connvisor-secret-{}", std::process::id()));
        std::fs::write(&path, "password\n").unwrap();
        let props = Properties::new()
            .with("name", "testCF")
            .with("password", format!("FILE({})", path.display()));

        let resolved = ExternalConfigLoader::new(Registry::new()).resolve(&props).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(resolved.get("password"), Some("password"));
        assert_eq!(resolved.get("name"), Some("testCF"));
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let props = Properties::new().with("password", "FILE(/nonexistent/connvisor/secret)");
        let err = ExternalConfigLoader::new(Registry::new())
            .resolve(&props)
            .unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_configuration");
    }

    #[test]
    fn test_registered_loader_resolves_its_prefix() {
        let registry = Registry::new();
        let props = Properties::new().with("password", "CUSTOM(password)");
        let loader = ExternalConfigLoader::new(Arc::clone(&registry));
        assert_eq!(loader.resolve(&props).unwrap().get("password"), Some("CUSTOM(password)"));

        let _reg = registry.publish::<dyn ConfigLoader>(
            CONFIG_LOADER_TYPE,
            Arc::new(EchoLoader("CUSTOM")),
            Properties::new(),
        );
        assert_eq!(loader.resolve(&props).unwrap().get("password"), Some("password"));
    }
}
