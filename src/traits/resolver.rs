//! Resolver traits for instance resolution.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::{downcast, downcast_all, AnyArc};
use crate::{ContextId, DiResult, Token};

/// Core resolver trait for object-safe resolution.
///
/// Implemented by [`Container`](crate::Container), searching every module,
/// and by [`ModuleRef`](crate::ModuleRef), searching what one module can see.
/// Most callers use the typed helpers of [`Resolver`] instead.
#[async_trait]
pub trait ResolverCore: Send + Sync {
    /// Resolves a static singleton.
    ///
    /// Fails with `InvalidScope` when the provider is transient or anything
    /// in its dependency tree is request scoped.
    async fn get_any(&self, token: &Token) -> DiResult<AnyArc>;

    /// Resolves within `context`, or within a fresh context id when `None`.
    ///
    /// Transient providers are created for a fresh inquirer on every call.
    async fn resolve_any(&self, token: &Token, context: Option<&ContextId>) -> DiResult<AnyArc>;
}

/// Typed resolution helpers built on [`ResolverCore`].
///
/// # Examples
///
/// ```
/// use ferrous_inject::{Container, ModuleDefinition, Provider, Resolver, Scope, Token};
///
/// struct Config { port: u16 }
/// struct RequestId(u64);
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_inject::DiResult<()> {
/// let app = ModuleDefinition::new("AppModule")
///     .provider(Provider::value(Token::of::<Config>(), Config { port: 8080 }))
///     .provider(Provider::factory(Token::of::<RequestId>(), |_deps| async { Ok(RequestId(7)) })
///         .scope(Scope::Request));
///
/// let container = Container::builder(app).build().await?;
/// assert_eq!(container.get_required::<Config>().await?.port, 8080);
///
/// let ctx = container.context_ids().create();
/// let id = container.resolve::<RequestId>(&Token::of::<RequestId>(), Some(&ctx)).await?;
/// assert_eq!(id.0, 7);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Resolver: ResolverCore {
    /// Resolves a static singleton registered under `token`.
    async fn get<T: Any + Send + Sync>(&self, token: &Token) -> DiResult<Arc<T>> {
        downcast::<T>(self.get_any(token).await?, token)
    }

    /// Resolves the static singleton registered under `T`'s own token.
    async fn get_required<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        let token = Token::of::<T>();
        downcast::<T>(self.get_any(&token).await?, &token)
    }

    /// Resolves `token` within `context`, or a fresh context id when `None`.
    async fn resolve<T: Any + Send + Sync>(&self, token: &Token, context: Option<&ContextId>) -> DiResult<Arc<T>> {
        downcast::<T>(self.resolve_any(token, context).await?, token)
    }

    /// Every value of a multi provider as a static singleton list.
    async fn get_all<T: Any + Send + Sync>(&self, token: &Token) -> DiResult<Vec<Arc<T>>> {
        downcast_all::<T>(self.get_any(token).await?, token)
    }

    /// Every value of a multi provider resolved within `context`.
    async fn resolve_all<T: Any + Send + Sync>(
        &self,
        token: &Token,
        context: Option<&ContextId>,
    ) -> DiResult<Vec<Arc<T>>> {
        downcast_all::<T>(self.resolve_any(token, context).await?, token)
    }
}
