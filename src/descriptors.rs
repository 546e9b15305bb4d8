//! Provider descriptors for introspection and diagnostics.

use crate::error::DependencyIndex;
use crate::module::{ModuleGraph, ModuleId};
use crate::provider::DependencyTarget;
use crate::wrapper::{InstanceWrapper, WrapperKind};
use crate::Scope;

/// Snapshot of one registered provider or controller after linking.
///
/// Built-in injectables (`REQUEST`, [`ModuleRef`](crate::ModuleRef)) are not
/// listed.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Container, ModuleDefinition, Provider, Scope};
///
/// struct Session;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_inject::DiResult<()> {
/// let app = ModuleDefinition::new("AppModule")
///     .provider(Provider::value("DB_URL", "postgres://localhost"))
///     .provider(Provider::class::<Session, _>(|_| Ok(Session)).scope(Scope::Request).inject("DB_URL"));
///
/// let container = Container::builder(app).build().await?;
/// let descriptors = container.descriptors();
///
/// let session = descriptors.iter().find(|d| d.name == "Session").unwrap();
/// assert_eq!(session.scope, Scope::Request);
/// assert!(!session.is_tree_static);
/// assert_eq!(session.dependencies[0].token.as_deref(), Some("DB_URL"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProviderDescriptor {
    /// Name of the host module
    pub module: String,
    pub module_id: ModuleId,
    /// Display name of the token
    pub token: String,
    /// Diagnostic name (class type name or token name)
    pub name: String,
    /// `class`, `value`, `factory`, `multi-factory`, `existing` or `multi`
    pub kind: &'static str,
    pub scope: Scope,
    pub durable: bool,
    pub is_tree_static: bool,
    pub is_tree_durable: bool,
    pub is_controller: bool,
    pub dependencies: Vec<DependencyDescriptor>,
}

/// One declared dependency and the provider it was linked to.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DependencyDescriptor {
    pub index: DependencyIndex,
    /// Token display name, `None` for an undefined forward reference
    pub token: Option<String>,
    pub optional: bool,
    pub forward: bool,
    /// Host module of the linked provider, `None` when unresolved
    pub resolved_in: Option<String>,
}

impl ProviderDescriptor {
    pub(crate) fn collect(graph: &ModuleGraph, arena: &[InstanceWrapper]) -> Vec<Self> {
        let mut ids: Vec<_> = graph
            .iter()
            .flat_map(|module| module.providers.values().chain(module.controllers.values()).copied())
            .collect();
        ids.sort();
        ids.dedup();

        ids.into_iter()
            .map(|id| &arena[id.0])
            .filter(|wrapper| !matches!(wrapper.kind, WrapperKind::ModuleRef | WrapperKind::Request))
            .map(|wrapper| Self::describe(graph, arena, wrapper))
            .collect()
    }

    fn describe(graph: &ModuleGraph, arena: &[InstanceWrapper], wrapper: &InstanceWrapper) -> Self {
        let dependencies = wrapper
            .dependencies
            .iter()
            .map(|(index, dependency)| {
                let link = wrapper.links.iter().find(|link| link.index == *index);
                DependencyDescriptor {
                    index: index.clone(),
                    token: link
                        .and_then(|link| link.token.as_ref())
                        .map(|token| token.display_name()),
                    optional: dependency.is_optional(),
                    forward: matches!(dependency.target(), DependencyTarget::Forward(_)),
                    resolved_in: link
                        .and_then(|link| link.target)
                        .map(|target| graph.module(arena[target.0].host).name().to_string()),
                }
            })
            .collect();

        Self {
            module: graph.module(wrapper.host).name().to_string(),
            module_id: wrapper.host,
            token: wrapper.token.display_name(),
            name: wrapper.name.clone(),
            kind: wrapper.kind_name(),
            scope: wrapper.scope,
            durable: wrapper.durable,
            is_tree_static: wrapper.is_dependency_tree_static(arena),
            is_tree_durable: wrapper.is_dependency_tree_durable(arena),
            is_controller: wrapper.is_controller,
            dependencies,
        }
    }

    pub fn is_request_scoped(&self) -> bool {
        !self.is_tree_static
    }
}
