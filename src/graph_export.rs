//! Serialized view of the module graph for visualization and debugging.
//!
//! Exports modules with their imports and exports, every provider with its
//! scope and static/durable flags, and one edge per linked dependency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptors::ProviderDescriptor;
use crate::{Container, DiError, DiResult, Scope};

/// Snapshot of a built container.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Container, ModuleDefinition, Provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_inject::DiResult<()> {
/// let shared = ModuleDefinition::new("SharedModule")
///     .provider(Provider::value("CLOCK", 0u64))
///     .export("CLOCK");
/// let app = ModuleDefinition::new("AppModule")
///     .import_module(shared)
///     .provider(Provider::factory("NOW", |deps| async move { Ok(*deps.get::<u64>(0)?) }).inject("CLOCK"));
///
/// let graph = Container::builder(app).build().await?.serialize_graph();
/// assert_eq!(graph.edges.len(), 1);
/// assert!(graph.to_json()?.contains("SharedModule"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedGraph {
    pub metadata: GraphMetadata,
    pub modules: Vec<SerializedModule>,
    pub providers: Vec<SerializedProvider>,
    pub edges: Vec<SerializedEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub root: Option<String>,
    pub module_count: usize,
    pub provider_count: usize,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModule {
    pub name: String,
    pub global: bool,
    /// Depth in the topology tree, `usize::MAX` for global modules
    pub distance: usize,
    pub imports: Vec<String>,
    /// Flattened set of tokens visible to importers, sorted
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedProvider {
    /// `Module/Token`, unique across the graph
    pub id: String,
    pub module: String,
    pub token: String,
    pub kind: String,
    pub scope: Scope,
    pub durable: bool,
    pub is_tree_static: bool,
    pub is_tree_durable: bool,
    pub is_controller: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedEdge {
    pub from: String,
    pub to: String,
    /// `index [n]` or `property "key"`
    pub at: String,
    pub optional: bool,
    pub forward: bool,
}

impl SerializedGraph {
    pub(crate) fn from_container(container: &Container) -> Self {
        let graph = container.graph();
        let descriptors = container.descriptors();

        let modules = graph
            .iter()
            .map(|module| {
                let mut exports: Vec<String> = graph
                    .exported_tokens(module.id())
                    .iter()
                    .map(|token| token.display_name())
                    .collect();
                exports.sort();
                SerializedModule {
                    name: module.name().to_string(),
                    global: module.is_global(),
                    distance: module.distance(),
                    imports: module
                        .imports()
                        .iter()
                        .map(|id| graph.module(*id).name().to_string())
                        .collect(),
                    exports,
                }
            })
            .collect::<Vec<_>>();

        let edges = descriptors
            .iter()
            .flat_map(|descriptor| {
                let from = node_id(&descriptor.module, &descriptor.token);
                descriptor.dependencies.iter().filter_map(move |dependency| {
                    let module = dependency.resolved_in.as_ref()?;
                    let token = dependency.token.as_ref()?;
                    Some(SerializedEdge {
                        from: from.clone(),
                        to: node_id(module, token),
                        at: dependency.index.to_string(),
                        optional: dependency.optional,
                        forward: dependency.forward,
                    })
                })
            })
            .collect();

        let providers: Vec<SerializedProvider> = descriptors.iter().map(SerializedProvider::from).collect();

        Self {
            metadata: GraphMetadata {
                root: graph.root().map(|root| graph.module(root).name().to_string()),
                module_count: modules.len(),
                provider_count: providers.len(),
                exported_at: Utc::now(),
            },
            modules,
            providers,
            edges,
        }
    }

    pub fn to_json(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self).map_err(DiError::custom)
    }

    pub fn to_yaml(&self) -> DiResult<String> {
        serde_yaml::to_string(self).map_err(DiError::custom)
    }
}

impl From<&ProviderDescriptor> for SerializedProvider {
    fn from(descriptor: &ProviderDescriptor) -> Self {
        Self {
            id: node_id(&descriptor.module, &descriptor.token),
            module: descriptor.module.clone(),
            token: descriptor.token.clone(),
            kind: descriptor.kind.to_string(),
            scope: descriptor.scope,
            durable: descriptor.durable,
            is_tree_static: descriptor.is_tree_static,
            is_tree_durable: descriptor.is_tree_durable,
            is_controller: descriptor.is_controller,
        }
    }
}

fn node_id(module: &str, token: &str) -> String {
    format!("{}/{}", module, token)
}
