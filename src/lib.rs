//! # ferrous-inject
//!
//! Module-oriented dependency injection for async Rust.
//!
//! ## Features
//!
//! - **Module graph**: imports, exports, re-exports, global and dynamic modules
//! - **Scopes**: Singleton, Request (per [`ContextId`]) and Transient (per inquirer)
//! - **Single-flight creation**: concurrent resolutions share one in-flight construction
//! - **Circular detection**: module import cycles, factory cycles and runtime self-references
//! - **Durable sub-trees**: a [`ContextIdStrategy`] may share request-scoped trees across requests
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_inject::{Container, ModuleDefinition, Provider, Resolver, Token};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UsersService {
//!     db: Arc<Database>,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ferrous_inject::DiResult<()> {
//! let database = ModuleDefinition::new("DatabaseModule")
//!     .provider(Provider::value(Token::of::<Database>(), Database { url: "postgres://localhost".into() }))
//!     .export(Token::of::<Database>());
//!
//! let users = ModuleDefinition::new("UsersModule")
//!     .import_module(database)
//!     .provider(
//!         Provider::class::<UsersService, _>(|deps| Ok(UsersService { db: deps.get::<Database>(0)? }))
//!             .inject(Token::of::<Database>()),
//!     );
//!
//! let container = Container::builder(users).build().await?;
//! let service = container.get_required::<UsersService>().await?;
//! assert_eq!(service.db.url, "postgres://localhost");
//! # Ok(())
//! # }
//! ```
//!
//! ## Scopes
//!
//! - **Singleton**: created once under the static context; the default
//! - **Request**: created once per [`ContextId`] and released with it
//! - **Transient**: created once per consumer ("inquirer")
//!
//! A singleton that depends on a request-scoped provider is itself resolved
//! per request. Such providers can't be fetched with [`Resolver::get`]; use
//! [`Resolver::resolve`] with a context id instead.
//!
//! ```rust
//! use ferrous_inject::{Container, DiError, ModuleDefinition, Provider, Resolver, Scope, Token};
//! use std::sync::Arc;
//!
//! struct RequestId(u64);
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ferrous_inject::DiResult<()> {
//! let app = ModuleDefinition::new("AppModule").provider(
//!     Provider::factory(Token::of::<RequestId>(), |_| async { Ok(RequestId(42)) }).scope(Scope::Request),
//! );
//! let container = Container::builder(app).build().await?;
//!
//! let first = container.context_ids().create();
//! let second = container.context_ids().create();
//! let token = Token::of::<RequestId>();
//!
//! let a = container.resolve::<RequestId>(&token, Some(&first)).await?;
//! let b = container.resolve::<RequestId>(&token, Some(&first)).await?;
//! let c = container.resolve::<RequestId>(&token, Some(&second)).await?;
//! assert!(Arc::ptr_eq(&a, &b));
//! assert!(!Arc::ptr_eq(&a, &c));
//!
//! assert!(matches!(container.get_required::<RequestId>().await, Err(DiError::InvalidScope { .. })));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod module;
pub mod observer;
pub mod provider;
pub mod scope;
pub mod token;
pub mod traits;
pub mod wrapper;

#[cfg(feature = "graph-export")]
pub mod graph_export;

mod container;
mod injector;
mod internal;

pub use config::ContainerOptions;
pub use container::{Container, ContainerBuilder, ModuleRef};
pub use context::{
    ContextId, ContextIdFactory, ContextIdResolver, ContextIdStrategy, HostComponentInfo, InquirerId, REQUEST,
    STATIC_CONTEXT_ID,
};
pub use descriptors::{DependencyDescriptor, ProviderDescriptor};
pub use error::{BoxError, DependencyIndex, DiError, DiResult};
pub use module::{
    DynamicModuleFactory, Export, ModuleDefinition, ModuleGraph, ModuleId, ModuleImport, Module, TopologyTree,
};
pub use observer::{ResolutionObserver, TracingObserver};
pub use provider::{
    forward_ref, AnyArc, Dependency, DependencyTarget, ForwardRef, Provider, ProviderFactory, ProviderKind,
    ResolvedDeps,
};
pub use scope::Scope;
pub use token::Token;
pub use traits::{Resolver, ResolverCore};
pub use wrapper::{InstanceSlot, InstanceWrapper, WrapperId};

#[cfg(feature = "graph-export")]
pub use graph_export::SerializedGraph;
