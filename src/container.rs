//! The container: bootstrap, resolution entry points and teardown.

use std::cmp::Reverse;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::ContainerOptions;
use crate::context::{ContextId, ContextIdFactory, ContextIdStrategy, InquirerId};
use crate::descriptors::ProviderDescriptor;
use crate::injector::{Injector, Inquirer};
use crate::internal::{DisposeBag, ResolutionPath};
use crate::module::builder::ModuleGraphBuilder;
use crate::module::{ModuleDefinition, ModuleGraph, ModuleId};
use crate::observer::{Observers, ResolutionObserver};
use crate::provider::AnyArc;
use crate::traits::{Resolver, ResolverCore};
use crate::wrapper::{InstanceWrapper, WrapperId};
use crate::{DiError, DiResult, Token};

pub(crate) struct ContainerInner {
    pub(crate) graph: ModuleGraph,
    pub(crate) wrappers: Vec<InstanceWrapper>,
    pub(crate) options: ContainerOptions,
    pub(crate) observers: Observers,
    pub(crate) context_ids: ContextIdFactory,
    pub(crate) disposers: Mutex<DisposeBag>,
    this: Weak<ContainerInner>,
}

impl ContainerInner {
    pub(crate) fn handle(&self) -> Weak<ContainerInner> {
        self.this.clone()
    }

    fn wrapper(&self, id: WrapperId) -> &InstanceWrapper {
        &self.wrappers[id.0]
    }

    /// Wrapper for `token`: within one module's visibility when `scope` is
    /// set, otherwise anywhere in the container.
    fn find(&self, scope: Option<ModuleId>, token: &Token) -> DiResult<WrapperId> {
        let found = match scope {
            Some(module) => self.graph.find_in(module, token),
            None => self.graph.find_anywhere(token),
        };
        found.ok_or_else(|| DiError::UnknownElement {
            token: token.display_name(),
        })
    }

    async fn get_in(&self, scope: Option<ModuleId>, token: &Token) -> DiResult<AnyArc> {
        let id = self.find(scope, token)?;
        let wrapper = self.wrapper(id);
        if wrapper.is_transient() || !wrapper.is_dependency_tree_static(&self.wrappers) {
            return Err(DiError::InvalidScope {
                token: token.display_name(),
            });
        }
        Injector::new(self)
            .load_instance(id, ContextId::static_context(), None, ResolutionPath::default())
            .await
    }

    async fn resolve_in(
        &self,
        scope: Option<ModuleId>,
        token: &Token,
        context: Option<&ContextId>,
        inquirer: Option<InquirerId>,
    ) -> DiResult<AnyArc> {
        let id = self.find(scope, token)?;
        let wrapper = self.wrapper(id);

        let context = match (context, inquirer) {
            (Some(context), Some(_)) => context.clone(),
            // A transient created in the static context for a throwaway
            // inquirer would never be released.
            (Some(context), None) if !(context.is_static() && wrapper.is_transient()) => context.clone(),
            _ => self.context_ids.create(),
        };
        let inquirer = match inquirer {
            Some(id) => Some(id),
            None if wrapper.is_transient() => Some(InquirerId::external()),
            None => None,
        }
        .map(|id| Inquirer {
            id,
            context: context.clone(),
        });

        trace!(token = %token, context = context.id(), "resolving");
        Injector::new(self)
            .load_instance(id, context, inquirer, ResolutionPath::default())
            .await
    }

    /// Creates every static singleton, deepest modules first.
    async fn instantiate_eagerly(&self) -> DiResult<()> {
        let mut order: Vec<(usize, WrapperId)> = self
            .graph
            .iter()
            .flat_map(|module| {
                module
                    .providers
                    .values()
                    .chain(module.controllers.values())
                    .map(move |id| (module.distance, *id))
            })
            .collect();
        order.sort_by_key(|(distance, id)| (Reverse(*distance), *id));

        let injector = Injector::new(self);
        let mut created = 0usize;
        for (_, id) in order {
            let wrapper = self.wrapper(id);
            if wrapper.is_transient() || !wrapper.is_dependency_tree_static(&self.wrappers) {
                continue;
            }
            injector
                .load_instance(id, ContextId::static_context(), None, ResolutionPath::default())
                .await?;
            created += 1;
        }
        debug!(singletons = created, "instantiated singletons");
        Ok(())
    }
}

/// Builder for [`Container`].
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ContainerBuilder, ContainerOptions, ModuleDefinition, Provider, Resolver, Token};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_inject::DiResult<()> {
/// let config = ModuleDefinition::new("ConfigModule")
///     .provider(Provider::value("DB_URL", String::from("postgres://localhost")))
///     .export("DB_URL");
///
/// let container = ContainerBuilder::new(ModuleDefinition::new("AppModule").import("ConfigModule"))
///     .declare(config)
///     .options(ContainerOptions::default().lazy())
///     .build()
///     .await?;
///
/// let url = container.get::<String>(&Token::named("DB_URL")).await?;
/// assert_eq!(url.as_str(), "postgres://localhost");
/// # Ok(())
/// # }
/// ```
pub struct ContainerBuilder {
    root: ModuleDefinition,
    declarations: Vec<ModuleDefinition>,
    options: ContainerOptions,
    observers: Observers,
    strategy: Option<Arc<dyn ContextIdStrategy>>,
}

impl ContainerBuilder {
    pub fn new(root: ModuleDefinition) -> Self {
        Self {
            root,
            declarations: Vec::new(),
            options: ContainerOptions::default(),
            observers: Observers::default(),
            strategy: None,
        }
    }

    /// Makes a module importable by name from any other module.
    pub fn declare(mut self, module: ModuleDefinition) -> Self {
        self.declarations.push(module);
        self
    }

    pub fn options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn observer(mut self, observer: impl ResolutionObserver + 'static) -> Self {
        self.observers.add(Arc::new(observer));
        self
    }

    pub fn context_id_strategy(mut self, strategy: impl ContextIdStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Scans the module graph, links every provider and, unless disabled,
    /// creates all static singletons.
    pub async fn build(self) -> DiResult<Container> {
        self.options.validate()?;
        let mut scanner = ModuleGraphBuilder::default();
        for module in self.declarations {
            scanner.declare(module);
        }
        let scanned = scanner.scan(self.root).await?;

        let context_ids = match self.strategy {
            Some(strategy) => ContextIdFactory::with_strategy(strategy),
            None => ContextIdFactory::new(),
        };
        let inner = Arc::new_cyclic(|this| ContainerInner {
            graph: scanned.graph,
            wrappers: scanned.wrappers,
            options: self.options,
            observers: self.observers,
            context_ids,
            disposers: Mutex::new(DisposeBag::default()),
            this: this.clone(),
        });

        if inner.options.instantiate_eagerly {
            inner.instantiate_eagerly().await?;
        }
        Ok(Container { inner })
    }
}

/// Dependency injection container built from a root module.
///
/// Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn builder(root: ModuleDefinition) -> ContainerBuilder {
        ContainerBuilder::new(root)
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.inner.graph
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub fn context_ids(&self) -> &ContextIdFactory {
        &self.inner.context_ids
    }

    /// Handle resolving through the visibility of the module named `name`.
    pub fn module_ref(&self, name: &str) -> Option<ModuleRef> {
        self.inner
            .graph
            .find(name)
            .map(|module| ModuleRef::new(self.inner.handle(), module))
    }

    /// Resolves `token` on behalf of `inquirer` within `context`.
    ///
    /// Transient providers return the same instance for repeated calls with
    /// the same inquirer and context.
    pub async fn resolve_as(&self, token: &Token, context: &ContextId, inquirer: InquirerId) -> DiResult<AnyArc> {
        self.inner.resolve_in(None, token, Some(context), Some(inquirer)).await
    }

    /// Whether no provider reachable from `token` is request scoped.
    pub fn is_dependency_tree_static(&self, token: &Token) -> DiResult<bool> {
        let id = self.inner.find(None, token)?;
        Ok(self.inner.wrapper(id).is_dependency_tree_static(&self.inner.wrappers))
    }

    pub fn is_dependency_tree_durable(&self, token: &Token) -> DiResult<bool> {
        let id = self.inner.find(None, token)?;
        Ok(self.inner.wrapper(id).is_dependency_tree_durable(&self.inner.wrappers))
    }

    /// Instance already created for `token` in `context`, without creating one.
    pub fn instance_in(&self, token: &Token, context: &ContextId) -> Option<AnyArc> {
        let id = self.inner.find(None, token).ok()?;
        let wrapper = self.inner.wrapper(id);
        let context = if wrapper.is_dependency_tree_static(&self.inner.wrappers) {
            ContextId::static_context()
        } else {
            context.clone()
        };
        wrapper.instance_by_context(&self.inner.wrappers, &context, None)
    }

    /// One descriptor per provider and controller, in registration order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        ProviderDescriptor::collect(&self.inner.graph, &self.inner.wrappers)
    }

    /// Runs the `on_destroy` hooks of every created singleton, most recently
    /// created first. Hooks run once; later calls are no-ops.
    pub async fn close(&self) {
        let hooks = {
            let mut bag = self.inner.disposers.lock();
            if bag.is_empty() {
                trace!("closing container, no destroy hooks pending");
                return;
            }
            debug!(hooks = bag.len(), "closing container");
            bag.drain_reverse()
        };
        for (name, hook) in hooks {
            trace!(provider = %name, "running destroy hook");
            hook.await;
        }
    }

    #[cfg(feature = "graph-export")]
    pub fn serialize_graph(&self) -> crate::graph_export::SerializedGraph {
        crate::graph_export::SerializedGraph::from_container(self)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("modules", &self.inner.graph.len())
            .field("wrappers", &self.inner.wrappers.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

#[async_trait]
impl ResolverCore for Container {
    async fn get_any(&self, token: &Token) -> DiResult<AnyArc> {
        self.inner.get_in(None, token).await
    }

    async fn resolve_any(&self, token: &Token, context: Option<&ContextId>) -> DiResult<AnyArc> {
        self.inner.resolve_in(None, token, context, None).await
    }
}

impl Resolver for Container {}

/// Injectable handle onto one module.
///
/// Resolves only what its module can see: its own providers and controllers
/// plus the exports of its imports. Inject it with `Token::of::<ModuleRef>()`.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{Container, ModuleDefinition, ModuleRef, Provider, Resolver, Token};
/// use std::sync::Arc;
///
/// struct Plugins { module: ModuleRef }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_inject::DiResult<()> {
/// let app = ModuleDefinition::new("AppModule")
///     .provider(Provider::value("GREETING", "hello"))
///     .provider(
///         Provider::class::<Plugins, _>(|deps| Ok(Plugins { module: (*deps.get::<ModuleRef>(0)?).clone() }))
///             .inject(Token::of::<ModuleRef>()),
///     );
/// let container = Container::builder(app).build().await?;
///
/// let plugins = container.get_required::<Plugins>().await?;
/// let greeting = plugins.module.get::<&'static str>(&Token::named("GREETING")).await?;
/// assert_eq!(*greeting, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ModuleRef {
    container: Weak<ContainerInner>,
    module: ModuleId,
}

impl ModuleRef {
    pub(crate) fn new(container: Weak<ContainerInner>, module: ModuleId) -> Self {
        Self { container, module }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    /// Name of the module, `None` once the container is dropped.
    pub fn module_name(&self) -> Option<String> {
        let container = self.container.upgrade()?;
        let name = container.graph.module(self.module).name().to_string();
        Some(name)
    }

    fn container(&self) -> DiResult<Arc<ContainerInner>> {
        self.container
            .upgrade()
            .ok_or_else(|| DiError::msg("the container owning this module has been dropped"))
    }

    pub async fn resolve_as(&self, token: &Token, context: &ContextId, inquirer: InquirerId) -> DiResult<AnyArc> {
        self.container()?
            .resolve_in(Some(self.module), token, Some(context), Some(inquirer))
            .await
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRef").field("module", &self.module).finish()
    }
}

#[async_trait]
impl ResolverCore for ModuleRef {
    async fn get_any(&self, token: &Token) -> DiResult<AnyArc> {
        self.container()?.get_in(Some(self.module), token).await
    }

    async fn resolve_any(&self, token: &Token, context: Option<&ContextId>) -> DiResult<AnyArc> {
        self.container()?.resolve_in(Some(self.module), token, context, None).await
    }
}

impl Resolver for ModuleRef {}
