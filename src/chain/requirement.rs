//! One link of a dependency chain.

use std::fmt;
use std::sync::Arc;

use crate::error::LifecycleError;
use crate::registry::Filter;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Selector {
    All,
    Parsed(Filter),
    Raw(String),
}

/// Selects the providers that satisfy one link: a type tag plus a property filter.
///
/// A textual filter is kept as written and only parsed when the chain is
/// activated, so syntax errors surface from
/// [`DependencyChain::activate`](super::DependencyChain::activate).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityRequirement {
    type_tag: Arc<str>,
    selector: Selector,
}

impl CapabilityRequirement {
    /// Any provider published under `type_tag`.
    pub fn of(type_tag: impl Into<Arc<str>>) -> Self {
        Self {
            type_tag: type_tag.into(),
            selector: Selector::All,
        }
    }

    /// Providers under `type_tag` matching the textual filter `expr`.
    pub fn filtered(type_tag: impl Into<Arc<str>>, expr: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            selector: Selector::Raw(expr.into()),
        }
    }

    /// Providers under `type_tag` matching an already built filter.
    pub fn matching(type_tag: impl Into<Arc<str>>, filter: Filter) -> Self {
        Self {
            type_tag: type_tag.into(),
            selector: Selector::Parsed(filter),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The registry filter for this link: type tag AND the property filter.
    pub fn resolve(&self) -> Result<Filter, LifecycleError> {
        let base = Filter::type_tag(&self.type_tag);
        match &self.selector {
            Selector::All => Ok(base),
            Selector::Parsed(f) => Ok(base.and_filter(f)),
            Selector::Raw(expr) => Ok(base.and_filter(&Filter::parse(expr)?)),
        }
    }
}

impl fmt::Display for CapabilityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::All => write!(f, "{}", self.type_tag),
            Selector::Parsed(filter) => write!(f, "{}{}", self.type_tag, filter),
            Selector::Raw(expr) => write!(f, "{}{}", self.type_tag, expr),
        }
    }
}
