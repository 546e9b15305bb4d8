//! Async factory support for factory providers.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::{AnyArc, ResolvedDeps};
use crate::DiResult;

/// Trait for factories producing a provider's value asynchronously.
///
/// Factory providers receive their resolved `inject` list in declaration
/// order. Closures are adapted automatically by [`Provider::factory`];
/// implement this trait directly for stateful factories.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ProviderFactory, ResolvedDeps, AnyArc, DiResult, Provider};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Pool { url: String }
///
/// struct PoolFactory { url: String }
///
/// #[async_trait]
/// impl ProviderFactory for PoolFactory {
///     async fn create(&self, _deps: ResolvedDeps) -> DiResult<AnyArc> {
///         Ok(Arc::new(Pool { url: self.url.clone() }))
///     }
/// }
///
/// let provider = Provider::factory_with("POOL", PoolFactory { url: "postgres://localhost".into() });
/// assert_eq!(provider.token().to_string(), "POOL");
/// ```
///
/// [`Provider::factory`]: crate::Provider::factory
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Produces the provider's value from its resolved dependencies.
    async fn create(&self, deps: ResolvedDeps) -> DiResult<AnyArc>;
}

/// Adapter turning an async closure into a [`ProviderFactory`].
pub(crate) struct FnFactory<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> FnFactory<F, T> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, T> ProviderFactory for FnFactory<F, T>
where
    F: Fn(ResolvedDeps) -> Fut + Send + Sync,
    Fut: Future<Output = DiResult<T>> + Send,
    T: Send + Sync + 'static,
{
    async fn create(&self, deps: ResolvedDeps) -> DiResult<AnyArc> {
        let value = (self.f)(deps).await?;
        Ok(Arc::new(value) as AnyArc)
    }
}
