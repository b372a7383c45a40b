//! Capability registry: published providers, filters and watchers.
//!
//! ## Contents
//! - [`Registry`] observable directory (publish / find / subscribe)
//! - [`Filter`] conjunction of `(key=value)` clauses
//! - [`ProviderRef`] shared handle on one published provider
//! - [`Registration`], [`Subscription`] RAII handles for publications and watchers

mod directory;
mod filter;

pub use directory::{
    ProviderId, ProviderRef, Registration, Registry, RegistryEvent, RegistryListener,
    Subscription,
};
pub use filter::Filter;
