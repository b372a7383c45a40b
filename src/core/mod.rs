//! Runtime core: the shared coordinator.
//!
//! - [`Coordinator`] owns configuration, event delivery and the registry;
//! - [`CoordinatorBuilder`] assembles it with optional subscribers.

mod builder;
mod coordinator;

pub use builder::CoordinatorBuilder;
pub use coordinator::Coordinator;
