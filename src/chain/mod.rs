//! # Chained optional-dependency composition.
//!
//! A [`DependencyChain`] composes an ordered list of [`CapabilityRequirement`]s into
//! one derived resource produced by an [`Assembly`]. The resource exists only while
//! every requirement resolves in the [`Registry`](crate::Registry).
//!
//! ```text
//! activate(reqs, assembly) ──► [link 0] [link 1] ... [link N]
//!                                  └──── all resolved? ────► build ──► resource
//!                              bound provider removed ─────► destroy ──► re-evaluate
//! ```

mod assembly;
mod engine;
mod requirement;

pub use assembly::{Assembly, AssemblyFn, Links};
pub use engine::{ChainStatus, DependencyChain};
pub use requirement::CapabilityRequirement;
