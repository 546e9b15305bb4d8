//! Provider declarations.
//!
//! A [`Provider`] says how to produce the value of one [`Token`]. It is plain
//! data: the container never inspects the produced types, it only consumes
//! the dependency lists and closures attached here.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::DependencyIndex;
use crate::{DiError, DiResult, Scope, Token};

pub mod args;
pub mod dependency;
pub mod factory;

pub use args::ResolvedDeps;
pub use dependency::{forward_ref, Dependency, DependencyTarget, ForwardRef};
pub use factory::ProviderFactory;

use factory::FnFactory;

/// Type-erased shared instance.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type Constructor = Arc<dyn Fn(&ResolvedDeps) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type PropertySetter = Arc<dyn Fn(&AnyArc, Option<AnyArc>) -> DiResult<()> + Send + Sync>;
pub(crate) type DestroyHook = Arc<dyn Fn(AnyArc) -> BoxFuture<'static, ()> + Send + Sync>;

/// Values aggregated under a multi-provider token, in registration order.
pub(crate) struct MultiInstances(pub(crate) Vec<AnyArc>);

/// How a token's value is produced.
#[derive(Clone)]
pub enum ProviderKind {
    /// Instantiate a type through its constructor, then inject properties
    Class(ClassProvider),
    /// Constant value
    Value(AnyArc),
    /// Call an async factory with the resolved `inject` list
    Factory(FactoryProvider),
    /// Forward to another token's resolved value
    Existing(Token),
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Class(_) => "class",
            ProviderKind::Value(_) => "value",
            ProviderKind::Factory(f) if f.multi => "multi-factory",
            ProviderKind::Factory(_) => "factory",
            ProviderKind::Existing(_) => "existing",
        }
    }
}

#[derive(Clone)]
pub struct ClassProvider {
    pub(crate) type_name: &'static str,
    pub(crate) ctor: Constructor,
    pub(crate) properties: Vec<PropertyInjection>,
}

/// A dependency assigned after construction.
#[derive(Clone)]
pub struct PropertyInjection {
    pub(crate) key: String,
    pub(crate) dependency: Dependency,
    pub(crate) setter: PropertySetter,
}

impl PropertyInjection {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}

#[derive(Clone)]
pub struct FactoryProvider {
    pub(crate) factory: Arc<dyn ProviderFactory>,
    pub(crate) multi: bool,
}

/// Declaration of how to produce the value of a token.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{Provider, Scope, Token};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let providers = vec![
///     Provider::value(Token::of::<Config>(), Config { url: "postgres://localhost".into() }),
///     Provider::class::<Database, _>(|deps| {
///         Ok(Database { url: deps.get::<Config>(0)?.url.clone() })
///     })
///     .inject(Token::of::<Config>()),
///     Provider::factory("CONNECTION_ID", |_deps| async { Ok(42u64) }).scope(Scope::Request),
///     Provider::existing("DB_ALIAS", Token::of::<Database>()),
/// ];
/// assert_eq!(providers[2].declared_scope(), Scope::Request);
/// ```
#[derive(Clone)]
pub struct Provider {
    pub(crate) token: Token,
    pub(crate) kind: ProviderKind,
    pub(crate) scope: Scope,
    pub(crate) durable: bool,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) on_destroy: Option<DestroyHook>,
}

impl Provider {
    fn with_kind(token: Token, kind: ProviderKind) -> Self {
        Self {
            token,
            kind,
            scope: Scope::Singleton,
            durable: false,
            dependencies: Vec::new(),
            on_destroy: None,
        }
    }

    /// Class provider registered under the type's own token.
    pub fn class<T, F>(ctor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDeps) -> DiResult<T> + Send + Sync + 'static,
    {
        Self::use_class(Token::of::<T>(), ctor)
    }

    /// Class provider registered under an explicit token.
    pub fn use_class<T, F>(token: impl Into<Token>, ctor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDeps) -> DiResult<T> + Send + Sync + 'static,
    {
        let ctor: Constructor = Arc::new(move |deps: &ResolvedDeps| {
            ctor(deps).map(|value| Arc::new(value) as AnyArc)
        });
        Self::with_kind(
            token.into(),
            ProviderKind::Class(ClassProvider {
                type_name: std::any::type_name::<T>(),
                ctor,
                properties: Vec::new(),
            }),
        )
    }

    pub fn value<T>(token: impl Into<Token>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::with_kind(token.into(), ProviderKind::Value(Arc::new(value)))
    }

    /// Factory provider from an async closure.
    pub fn factory<T, F, Fut>(token: impl Into<Token>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ResolvedDeps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        Self::factory_with(token, FnFactory::new(factory))
    }

    /// Factory provider from a [`ProviderFactory`] implementation.
    pub fn factory_with(token: impl Into<Token>, factory: impl ProviderFactory + 'static) -> Self {
        Self::with_kind(
            token.into(),
            ProviderKind::Factory(FactoryProvider {
                factory: Arc::new(factory),
                multi: false,
            }),
        )
    }

    /// Alias resolving to another token's value.
    pub fn existing(token: impl Into<Token>, target: impl Into<Token>) -> Self {
        Self::with_kind(token.into(), ProviderKind::Existing(target.into()))
    }

    /// Appends a constructor parameter or factory `inject` entry.
    pub fn inject(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Marks a request-scoped provider as durable: its context id may be
    /// remapped by the [`ContextIdStrategy`](crate::ContextIdStrategy).
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Marks a factory provider as multi: registrations under the same token
    /// aggregate into an ordered list. No effect on other provider kinds.
    pub fn multi(mut self) -> Self {
        if let ProviderKind::Factory(factory) = &mut self.kind {
            factory.multi = true;
        }
        self
    }

    /// Adds a property injection to a class provider; the setter runs after
    /// the constructor with the resolved value (`None` for an absent optional
    /// dependency). No effect on other provider kinds.
    pub fn property<T, D, S>(mut self, key: impl Into<String>, dependency: impl Into<Dependency>, setter: S) -> Self
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
        S: Fn(&T, Option<Arc<D>>) + Send + Sync + 'static,
    {
        let key = key.into();
        let dependency = dependency.into();
        if let ProviderKind::Class(class) = &mut self.kind {
            let token = self.token.clone();
            let setter: PropertySetter = Arc::new(move |instance: &AnyArc, value: Option<AnyArc>| {
                let target = (**instance)
                    .downcast_ref::<T>()
                    .ok_or_else(|| DiError::TypeMismatch {
                        token: token.display_name(),
                        expected: std::any::type_name::<T>(),
                    })?;
                let value = match value {
                    Some(value) => Some(downcast::<D>(value, &token)?),
                    None => None,
                };
                setter(target, value);
                Ok(())
            });
            class.properties.push(PropertyInjection {
                key,
                dependency,
                setter,
            });
        }
        self
    }

    /// Registers a teardown hook run by [`Container::close`](crate::Container::close)
    /// for each singleton instance this provider created.
    pub fn on_destroy<T, F, Fut>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: DestroyHook = Arc::new(move |instance: AnyArc| match instance.downcast::<T>() {
            Ok(instance) => hook(instance).boxed(),
            Err(_) => futures::future::ready(()).boxed(),
        });
        self.on_destroy = Some(hook);
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn declared_scope(&self) -> Scope {
        self.scope
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_multi(&self) -> bool {
        matches!(&self.kind, ProviderKind::Factory(f) if f.multi)
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Name used in diagnostics: the class type for class providers, the token otherwise.
    pub(crate) fn name(&self) -> String {
        match &self.kind {
            ProviderKind::Class(class) => crate::token::short_type_name(class.type_name),
            _ => self.token.display_name(),
        }
    }

    /// All dependencies with their position or property key.
    ///
    /// Values carry none; an alias depends on its target alone.
    pub(crate) fn indexed_dependencies(&self) -> Vec<(DependencyIndex, Dependency)> {
        let positional = || {
            self.dependencies
                .iter()
                .enumerate()
                .map(|(i, dep)| (DependencyIndex::Position(i), dep.clone()))
        };
        match &self.kind {
            ProviderKind::Value(_) => Vec::new(),
            ProviderKind::Existing(target) => {
                vec![(DependencyIndex::Position(0), Dependency::token(target.clone()))]
            }
            ProviderKind::Factory(_) => positional().collect(),
            ProviderKind::Class(class) => positional()
                .chain(
                    class
                        .properties
                        .iter()
                        .map(|p| (DependencyIndex::Property(p.key.clone()), p.dependency.clone())),
                )
                .collect(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("kind", &self.kind.name())
            .field("scope", &self.scope)
            .field("durable", &self.durable)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

pub(crate) fn downcast<T: Any + Send + Sync>(value: AnyArc, token: &Token) -> DiResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        token: token.display_name(),
        expected: std::any::type_name::<T>(),
    })
}

/// Downcasts a multi-provider list, or a single value as a one-element list.
pub(crate) fn downcast_all<T: Any + Send + Sync>(value: AnyArc, token: &Token) -> DiResult<Vec<Arc<T>>> {
    match value.downcast::<MultiInstances>() {
        Ok(multi) => multi
            .0
            .iter()
            .map(|item| downcast::<T>(item.clone(), token))
            .collect(),
        Err(single) => Ok(vec![downcast::<T>(single, token)?]),
    }
}
