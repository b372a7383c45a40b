//! # Flat key/value property maps.
//!
//! Every managed resource is configured from a [`Properties`] map supplied by an
//! external configuration store. The same map type carries the service properties
//! a provider is published with in the [`Registry`](crate::Registry).
//!
//! ## Key rules
//! ```text
//! ".password"        hidden: never republished, unhidden before forwarding
//! "url"              local: forwarded to provider construction
//! "pool.maxTotal"    whitelisted prefix: forwarded as-is
//! "broker.clientId"  stripped prefix: forwarded as "clientId"
//! "tenant.region"    namespaced: not forwarded
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// Marker prefix for keys that must not be republished.
pub const HIDDEN_PREFIX: char = '.';

/// Service property holding the provider type tag.
pub const TYPE_KEY: &str = "objectClass";

/// Service property holding the provider ranking (integer, default `0`).
pub const RANKING_KEY: &str = "service.ranking";

/// Service property holding the registry-assigned provider id.
pub const ID_KEY: &str = "service.id";

/// Local keys that are never forwarded to provider construction.
const NOT_FORWARDED_KEYS: &[&str] = &["name", "connectionFactoryType"];

/// Namespaced prefixes that are forwarded unchanged.
const FORWARDED_PREFIXES: &[&str] = &["pool.", "factory."];

/// Namespaced prefix that is forwarded with the prefix stripped.
const STRIPPED_PREFIX: &str = "broker.";

/// Ordered flat string map.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Looks up `key`, falling back to its hidden form (`.key`).
    pub fn get_visible_or_hidden(&self, key: &str) -> Option<&str> {
        self.get(key)
            .or_else(|| self.get(&format!("{HIDDEN_PREFIX}{key}")))
    }

    /// Returns the value trimmed, treating blank values as absent.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Parses a boolean the lenient way: only `true` (any case) is `true`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get_trimmed(key)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of the map without hidden keys and without the listed private keys.
    ///
    /// This is the view used whenever properties are republished.
    pub fn public_view(&self, private: &[&str]) -> Properties {
        self.iter()
            .filter(|(k, _)| !is_hidden(k) && !private.contains(k))
            .collect()
    }

    /// Copy of the map restricted to the keys a capability provider may see.
    pub fn forwarded(&self) -> Properties {
        let mut out = Properties::new();
        for (key, value) in self.iter() {
            let key = unhide(key);
            if should_forward(key) {
                out.insert(key, value);
            } else if let Some(stripped) = key.strip_prefix(STRIPPED_PREFIX) {
                out.insert(stripped, value);
            }
        }
        out
    }
}

/// True if `key` carries the hidden marker.
pub fn is_hidden(key: &str) -> bool {
    key.starts_with(HIDDEN_PREFIX)
}

/// Strips the hidden marker, if any.
pub fn unhide(key: &str) -> &str {
    key.strip_prefix(HIDDEN_PREFIX).unwrap_or(key)
}

fn should_forward(key: &str) -> bool {
    let local = !key.contains('.') && !NOT_FORWARDED_KEYS.contains(&key);
    local || FORWARDED_PREFIXES.iter().any(|p| key.starts_with(p))
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // hidden values are usually secrets
        f.debug_map()
            .entries(self.iter().map(|(k, v)| {
                if is_hidden(k) { (k, "***") } else { (k, v) }
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Properties {
        Properties::new()
            .with("name", "mycf")
            .with("type", "artemis")
            .with("user", "theuser")
            .with(".password", "thepassword")
            .with("localproperty", "something2")
            .with("nonlocal.property", "something")
            .with("pool.maxTotal", "10")
            .with("factory.poolStatements", "true")
            .with("connectionFactoryType", "ConnectionFactory")
            .with("broker.clientId", "c1")
    }

    #[test]
    fn test_public_view_drops_hidden_and_private() {
        let public = sample().public_view(&["user"]);
        assert!(!public.contains_key(".password"));
        assert!(!public.contains_key("user"));
        assert_eq!(public.get("nonlocal.property"), Some("something"));
        assert_eq!(public.len(), sample().len() - 2);
    }

    #[test]
    fn test_forwarded_applies_namespace_rules() {
        let fwd = sample().forwarded();
        assert_eq!(fwd.get("password"), Some("thepassword"));
        assert_eq!(fwd.get("user"), Some("theuser"));
        assert_eq!(fwd.get("localproperty"), Some("something2"));
        assert_eq!(fwd.get("pool.maxTotal"), Some("10"));
        assert_eq!(fwd.get("factory.poolStatements"), Some("true"));
        assert_eq!(fwd.get("clientId"), Some("c1"));
        assert_eq!(fwd.get("type"), Some("artemis"));
        assert!(!fwd.contains_key("name"));
        assert!(!fwd.contains_key("connectionFactoryType"));
        assert!(!fwd.contains_key("nonlocal.property"));
    }

    #[test]
    fn test_debug_masks_hidden_values() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("thepassword"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_lenient_bool() {
        let p = Properties::new().with("a", " TRUE ").with("b", "yes");
        assert!(p.get_bool("a"));
        assert!(!p.get_bool("b"));
        assert!(!p.get_bool("missing"));
    }
}
