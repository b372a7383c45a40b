//! # Build and destroy functions of a chain.
//!
//! An [`Assembly`] turns the providers currently bound to every link ([`Links`])
//! into one derived resource, and tears that resource down again.
//!
//! - [`Assembly::build`] may perform blocking I/O and may fail; a failure leaves
//!   the chain unbuilt until the next provider change.
//! - [`Assembly::destroy`] is infallible from the chain's point of view; errors are
//!   the implementation's to log.
//!
//! [`AssemblyFn`] adapts a pair of synchronous closures.
//!
//! ## Example
//! ```rust
//! use connvisor::chain::{AssemblyFn, Links};
//! use connvisor::ProviderError;
//!
//! let assembly = AssemblyFn::new(
//!     |links: &Links| Ok::<_, ProviderError>(links.len()),
//!     |_built: usize| {},
//! );
//! # let _ = assembly;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::registry::{ProviderId, ProviderRef};

/// Providers bound to a chain's links, in requirement order.
#[derive(Clone, Debug)]
pub struct Links {
    providers: Vec<ProviderRef>,
}

impl Links {
    pub(crate) fn new(providers: Vec<ProviderRef>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The provider bound to link `index`.
    pub fn get(&self, index: usize) -> Option<&ProviderRef> {
        self.providers.get(index)
    }

    /// The typed object bound to link `index`.
    ///
    /// Fails with [`ProviderError::Construction`] when the link is missing or
    /// the provider was not published as `Arc<T>`.
    pub fn object<T>(&self, index: usize) -> Result<Arc<T>, ProviderError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let provider = self
            .get(index)
            .ok_or_else(|| ProviderError::construction(format!("no provider at link {index}")))?;
        provider.downcast::<T>().ok_or_else(|| {
            ProviderError::construction(format!(
                "provider {} at link {index} has an unexpected type",
                provider.id()
            ))
        })
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(ProviderRef::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderRef> {
        self.providers.iter()
    }
}

/// Builds and destroys the derived resource of a chain.
#[async_trait]
pub trait Assembly: Send + Sync + 'static {
    /// The derived resource.
    type Output: Send + 'static;

    /// Creates the resource from the currently bound providers.
    async fn build(&self, links: &Links) -> Result<Self::Output, ProviderError>;

    /// Releases a resource previously returned by `build`.
    async fn destroy(&self, output: Self::Output);
}

/// Closure-backed [`Assembly`].
pub struct AssemblyFn<B, D, T> {
    build: B,
    destroy: D,
    _output: PhantomData<fn() -> T>,
}

impl<B, D, T> AssemblyFn<B, D, T>
where
    B: Fn(&Links) -> Result<T, ProviderError> + Send + Sync + 'static,
    D: Fn(T) + Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new(build: B, destroy: D) -> Self {
        Self {
            build,
            destroy,
            _output: PhantomData,
        }
    }
}

#[async_trait]
impl<B, D, T> Assembly for AssemblyFn<B, D, T>
where
    B: Fn(&Links) -> Result<T, ProviderError> + Send + Sync + 'static,
    D: Fn(T) + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn build(&self, links: &Links) -> Result<T, ProviderError> {
        (self.build)(links)
    }

    async fn destroy(&self, output: T) {
        (self.destroy)(output)
    }
}
