//! Module declarations and the module graph.
//!
//! A [`ModuleDefinition`] is plain data describing one node of the import
//! graph: its providers, controllers, imports and exports. Definitions are
//! handed to the [`ContainerBuilder`](crate::ContainerBuilder), which scans
//! them into a [`ModuleGraph`] once at startup.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{DiResult, Provider, Token};

pub(crate) mod builder;
pub mod graph;
pub mod topology;

pub use graph::{Module, ModuleGraph, ModuleId};
pub use topology::TopologyTree;

/// Trait for modules produced asynchronously at scan time.
///
/// The equivalent of a `forRoot(options)` style module: the factory runs once
/// while the graph is built and the returned definition is registered like
/// any other. Closures returning a future implement this trait automatically.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ModuleDefinition, Provider};
///
/// let config = ModuleDefinition::new("AppModule").import_dynamic(|| async {
///     let url = String::from("postgres://localhost");
///     Ok(ModuleDefinition::new("DatabaseModule")
///         .provider(Provider::value("DB_URL", url))
///         .export("DB_URL"))
/// });
/// assert_eq!(config.name(), "AppModule");
/// ```
#[async_trait]
pub trait DynamicModuleFactory: Send + Sync {
    async fn create(&self) -> DiResult<ModuleDefinition>;
}

#[async_trait]
impl<F, Fut> DynamicModuleFactory for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = DiResult<ModuleDefinition>> + Send,
{
    async fn create(&self) -> DiResult<ModuleDefinition> {
        (self)().await
    }
}

/// Lazy module reference evaluated after every eagerly imported module is
/// registered. Breaks import cycles.
#[derive(Clone)]
pub struct ForwardModuleRef(Arc<dyn Fn() -> Option<String> + Send + Sync>);

impl ForwardModuleRef {
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        ForwardModuleRef(Arc::new(thunk))
    }

    pub(crate) fn evaluate(&self) -> Option<String> {
        (self.0)()
    }
}

impl fmt::Debug for ForwardModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForwardModuleRef(..)")
    }
}

/// One entry of a module's import list.
#[derive(Clone)]
pub enum ModuleImport {
    /// Module declared elsewhere, looked up by name
    Named(String),
    /// Module declared in place
    Inline(Box<ModuleDefinition>),
    /// Module produced by an async factory
    Dynamic(Arc<dyn DynamicModuleFactory>),
    /// Module named by a thunk evaluated after the scan
    Forward(ForwardModuleRef),
}

impl fmt::Debug for ModuleImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleImport::Named(name) => write!(f, "Named({})", name),
            ModuleImport::Inline(def) => write!(f, "Inline({})", def.name),
            ModuleImport::Dynamic(_) => f.write_str("Dynamic(..)"),
            ModuleImport::Forward(_) => f.write_str("Forward(..)"),
        }
    }
}

/// One entry of a module's export list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Export {
    /// A token provided by the exporting module
    Token(Token),
    /// An imported module whose exports are passed through
    Module(String),
}

/// Declaration of a module.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ModuleDefinition, Provider, Token};
///
/// struct UsersService;
///
/// let users = ModuleDefinition::new("UsersModule")
///     .provider(Provider::class::<UsersService, _>(|_| Ok(UsersService)))
///     .export(Token::of::<UsersService>());
///
/// let app = ModuleDefinition::new("AppModule")
///     .import_module(users)
///     .import("ConfigModule");
///
/// assert_eq!(app.imports().len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct ModuleDefinition {
    pub(crate) name: String,
    pub(crate) global: bool,
    pub(crate) imports: Vec<ModuleImport>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) controllers: Vec<Provider>,
    pub(crate) exports: Vec<Export>,
}

impl ModuleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            global: false,
            imports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Makes the module visible to every other module without an import.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Imports a module declared on the builder (or inline elsewhere) by name.
    pub fn import(mut self, name: impl Into<String>) -> Self {
        self.imports.push(ModuleImport::Named(name.into()));
        self
    }

    pub fn import_module(mut self, module: ModuleDefinition) -> Self {
        self.imports.push(ModuleImport::Inline(Box::new(module)));
        self
    }

    pub fn import_dynamic(mut self, factory: impl DynamicModuleFactory + 'static) -> Self {
        self.imports.push(ModuleImport::Dynamic(Arc::new(factory)));
        self
    }

    /// Imports a module through a forward reference.
    ///
    /// The thunk runs after the scan, so it may name a module that imports
    /// this one. Returning `None` fails the build.
    pub fn import_forward<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.imports.push(ModuleImport::Forward(ForwardModuleRef::new(thunk)));
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Registers a controller. Controllers are instantiated like providers
    /// but are never visible to other modules.
    pub fn controller(mut self, controller: Provider) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(Export::Token(token.into()));
        self
    }

    /// Re-exports an imported module.
    pub fn reexport(mut self, module: impl Into<String>) -> Self {
        self.exports.push(Export::Module(module.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn imports(&self) -> &[ModuleImport] {
        &self.imports
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }
}
