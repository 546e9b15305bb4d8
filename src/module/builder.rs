//! Scans module declarations into the module graph and links providers.

use ahash::AHashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use super::{Export, ForwardModuleRef, ModuleDefinition, ModuleGraph, ModuleId, ModuleImport, TopologyTree};
use crate::container::ModuleRef;
use crate::context::REQUEST;
use crate::internal::find_factory_cycle;
use crate::provider::{Dependency, Provider, ProviderKind};
use crate::wrapper::{InstanceWrapper, Link, WrapperId, WrapperKind};
use crate::{DiError, DiResult, Scope, Token};

/// Name of the global module hosting built-in providers.
pub(crate) const INTERNAL_CORE_MODULE: &str = "InternalCoreModule";

struct PendingForward {
    importer: ModuleId,
    index: usize,
    reference: ForwardModuleRef,
}

/// Result of a scan: the module arena and the wrapper arena.
pub(crate) struct ScannedGraph {
    pub(crate) graph: ModuleGraph,
    pub(crate) wrappers: Vec<InstanceWrapper>,
}

#[derive(Default)]
pub(crate) struct ModuleGraphBuilder {
    declarations: AHashMap<String, ModuleDefinition>,
    graph: ModuleGraph,
    wrappers: Vec<InstanceWrapper>,
    pending: Vec<PendingForward>,
}

impl ModuleGraphBuilder {
    /// Makes a module importable by name.
    pub(crate) fn declare(&mut self, module: ModuleDefinition) {
        self.declarations.insert(module.name.clone(), module);
    }

    /// Registers `root` and everything reachable from it, then links every
    /// provider's dependencies.
    pub(crate) async fn scan(mut self, root: ModuleDefinition) -> DiResult<ScannedGraph> {
        self.register_core();

        let root = self.add_module(root, &mut Vec::new()).await?;
        self.graph.root = Some(root);

        self.resolve_forward_imports().await?;
        self.bind_global_modules();
        self.link_exports()?;
        self.assign_distances(root);
        self.link_dependencies();

        debug!(
            modules = self.graph.len(),
            wrappers = self.wrappers.len(),
            "module graph scanned"
        );
        Ok(ScannedGraph {
            graph: self.graph,
            wrappers: self.wrappers,
        })
    }

    fn register_core(&mut self) {
        let core = self.graph.insert(INTERNAL_CORE_MODULE, true);
        let token = Token::named(REQUEST);
        let request = self.push_wrapper(|id| {
            InstanceWrapper::builtin(id, core, token.clone(), WrapperKind::Request, Scope::Request)
        });
        let module = self.graph.module_mut(core);
        module.providers.insert(token.clone(), request);
        module.declared_exports.push(Export::Token(token));
        self.add_module_ref(core);
    }

    /// Registers a module and, depth first, its imports.
    ///
    /// `path` holds the modules currently being registered; meeting one of
    /// them again is a cycle that only a forward reference can break.
    pub(crate) fn add_module<'a>(
        &'a mut self,
        module: ModuleDefinition,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, DiResult<ModuleId>> {
        async move {
            check_import_cycle(path, &module.name)?;
            if let Some(existing) = self.graph.find(&module.name) {
                return Ok(existing);
            }

            let id = self.graph.insert(&module.name, module.global);
            self.declarations
                .entry(module.name.clone())
                .or_insert_with(|| module.clone());
            debug!(module = %module.name, global = module.global, "registering module");

            let ModuleDefinition {
                name,
                imports,
                providers,
                controllers,
                exports,
                ..
            } = module;

            self.add_module_ref(id);
            check_factory_cycles(&name, &providers)?;
            for provider in providers {
                self.add_provider(provider, id);
            }
            for controller in controllers {
                self.add_controller(controller, id);
            }
            self.graph.module_mut(id).declared_exports = exports;

            path.push(name.clone());
            for (index, import) in imports.into_iter().enumerate() {
                let imported = match import {
                    ModuleImport::Named(target) => {
                        check_import_cycle(path, &target)?;
                        match self.graph.find(&target) {
                            Some(existing) => existing,
                            None => {
                                let declaration = self.declaration(&target, &name)?;
                                self.add_module(declaration, path).await?
                            }
                        }
                    }
                    ModuleImport::Inline(inline) => self.add_module(*inline, path).await?,
                    ModuleImport::Dynamic(factory) => {
                        let declaration = factory.create().await?;
                        self.add_module(declaration, path).await?
                    }
                    ModuleImport::Forward(reference) => {
                        self.pending.push(PendingForward {
                            importer: id,
                            index,
                            reference,
                        });
                        continue;
                    }
                };
                self.graph.module_mut(id).add_import(imported);
            }
            path.pop();

            Ok(id)
        }
        .boxed()
    }

    fn declaration(&self, name: &str, importer: &str) -> DiResult<ModuleDefinition> {
        self.declarations
            .get(name)
            .cloned()
            .ok_or_else(|| DiError::UnknownModule {
                name: name.to_string(),
                importer: importer.to_string(),
            })
    }

    /// Evaluates forward module references once the eager scan is complete.
    /// Modules first reached this way may queue further references.
    async fn resolve_forward_imports(&mut self) -> DiResult<()> {
        while !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            for forward in pending {
                let importer = self.graph.module(forward.importer).name.clone();
                let target = forward
                    .reference
                    .evaluate()
                    .ok_or_else(|| DiError::UndefinedForwardRef {
                        importer: importer.clone(),
                        index: forward.index,
                    })?;
                let imported = match self.graph.find(&target) {
                    Some(existing) => existing,
                    None => {
                        let declaration = self.declaration(&target, &importer)?;
                        self.add_module(declaration, &mut Vec::new()).await?
                    }
                };
                debug!(module = %importer, import = %target, "resolved forward import");
                self.graph.module_mut(forward.importer).add_import(imported);
            }
        }
        Ok(())
    }

    fn bind_global_modules(&mut self) {
        let globals: Vec<ModuleId> = self
            .graph
            .iter()
            .filter(|module| module.global)
            .map(|module| module.id)
            .collect();
        for index in 0..self.graph.len() {
            let module = self.graph.module_mut(ModuleId(index));
            for global in &globals {
                module.add_import(*global);
            }
        }
    }

    /// Validates declared exports and records the effective ones.
    fn link_exports(&mut self) -> DiResult<()> {
        for index in 0..self.graph.len() {
            let id = ModuleId(index);
            let module = self.graph.module(id);
            let mut tokens = Vec::new();
            let mut modules = Vec::new();
            for export in &module.declared_exports {
                match export {
                    Export::Token(token) if module.providers.contains_key(token) => tokens.push(token.clone()),
                    Export::Token(token) => {
                        return Err(DiError::UnknownExport {
                            module: module.name.clone(),
                            token: token.display_name(),
                        })
                    }
                    Export::Module(name) => match self.graph.find(name).filter(|m| module.imports.contains(m)) {
                        Some(reexported) => modules.push(reexported),
                        None => {
                            return Err(DiError::UnknownExport {
                                module: module.name.clone(),
                                token: name.clone(),
                            })
                        }
                    },
                }
            }
            let module = self.graph.module_mut(id);
            module.exported_tokens.extend(tokens);
            module.exported_modules = modules;
        }
        Ok(())
    }

    fn assign_distances(&mut self, root: ModuleId) {
        let tree = TopologyTree::new(&self.graph, root);
        let mut depths = Vec::with_capacity(tree.len());
        tree.walk(|module, depth| depths.push((module, depth)));
        for (module, depth) in depths {
            self.graph.module_mut(module).distance = depth;
        }
        for module in self.graph.modules.iter_mut().filter(|m| m.global) {
            module.distance = usize::MAX;
        }
    }

    fn push_wrapper<F>(&mut self, make: F) -> WrapperId
    where
        F: FnOnce(WrapperId) -> InstanceWrapper,
    {
        let id = WrapperId(self.wrappers.len());
        self.wrappers.push(make(id));
        id
    }

    fn add_module_ref(&mut self, module: ModuleId) {
        let token = Token::of::<ModuleRef>();
        let wrapper = self.push_wrapper(|id| {
            InstanceWrapper::builtin(id, module, token.clone(), WrapperKind::ModuleRef, Scope::Singleton)
        });
        self.graph.module_mut(module).providers.insert(token, wrapper);
    }

    /// Binds a provider in `module`. Registering a token again replaces the
    /// previous binding; multi providers append to a single aggregate.
    pub(crate) fn add_provider(&mut self, provider: Provider, module: ModuleId) -> WrapperId {
        if provider.is_multi() {
            return self.add_multi_provider(provider, module);
        }
        let token = provider.token.clone();
        match self.graph.module(module).providers.get(&token).copied() {
            Some(existing) => {
                self.wrappers[existing.0] = InstanceWrapper::from_provider(existing, module, provider, false);
                existing
            }
            None => {
                let id = self.push_wrapper(|id| InstanceWrapper::from_provider(id, module, provider, false));
                self.graph.module_mut(module).providers.insert(token, id);
                id
            }
        }
    }

    fn add_multi_provider(&mut self, provider: Provider, module: ModuleId) -> WrapperId {
        let token = provider.token.clone();
        let scope = provider.scope;
        let durable = provider.durable;
        let member = self.push_wrapper(|id| InstanceWrapper::from_provider(id, module, provider, false));

        let existing = self.graph.module(module).providers.get(&token).copied();
        if let Some(existing) = existing {
            let aggregate = &mut self.wrappers[existing.0];
            if let WrapperKind::Multi(members) = &mut aggregate.kind {
                members.push(member);
                aggregate.durable |= durable;
                return existing;
            }
        }

        let make = |id| {
            let mut aggregate =
                InstanceWrapper::builtin(id, module, token.clone(), WrapperKind::Multi(vec![member]), scope);
            aggregate.durable = durable;
            aggregate
        };
        match existing {
            Some(existing) => {
                self.wrappers[existing.0] = make(existing);
                existing
            }
            None => {
                let id = self.push_wrapper(make);
                self.graph.module_mut(module).providers.insert(token.clone(), id);
                id
            }
        }
    }

    pub(crate) fn add_controller(&mut self, controller: Provider, module: ModuleId) -> WrapperId {
        let token = controller.token.clone();
        match self.graph.module(module).controllers.get(&token).copied() {
            Some(existing) => {
                self.wrappers[existing.0] = InstanceWrapper::from_provider(existing, module, controller, true);
                existing
            }
            None => {
                let id = self.push_wrapper(|id| InstanceWrapper::from_provider(id, module, controller, true));
                self.graph.module_mut(module).controllers.insert(token, id);
                id
            }
        }
    }

    /// Resolves every declared dependency to the wrapper its host module
    /// sees. Failures are stored on the consumer and raised when it is
    /// instantiated.
    fn link_dependencies(&mut self) {
        for index in 0..self.wrappers.len() {
            let (links, error) = self.link_wrapper(&self.wrappers[index]);
            if let Some(error) = &error {
                debug!(provider = %self.wrappers[index].name, %error, "unresolvable dependency");
            }
            let wrapper = &mut self.wrappers[index];
            wrapper.links = links;
            wrapper.link_error = error;
        }
    }

    fn link_wrapper(&self, wrapper: &InstanceWrapper) -> (Vec<Link>, Option<DiError>) {
        let module = &self.graph.module(wrapper.host).name;
        let mut links = Vec::with_capacity(wrapper.dependencies.len());
        let mut error = None;

        for (index, dependency) in &wrapper.dependencies {
            let token = dependency.evaluate();
            let target = token.as_ref().and_then(|token| self.graph.lookup(wrapper.host, token));
            if target.is_none() && !dependency.is_optional() && error.is_none() {
                error = Some(match &token {
                    Some(token) => DiError::UnknownDependencies {
                        consumer: wrapper.name.clone(),
                        signature: wrapper.signature(index),
                        token: token.display_name(),
                        index: index.clone(),
                        module: module.clone(),
                    },
                    None => DiError::UndefinedDependency {
                        consumer: wrapper.name.clone(),
                        signature: wrapper.signature(index),
                        index: index.clone(),
                        module: module.clone(),
                    },
                });
            }
            links.push(Link {
                index: index.clone(),
                token,
                target,
            });
        }
        (links, error)
    }
}

fn check_import_cycle(path: &[String], name: &str) -> DiResult<()> {
    match path.iter().position(|entry| entry == name) {
        Some(start) => {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            Err(DiError::InvalidModule { path: cycle })
        }
        None => Ok(()),
    }
}

/// Rejects a cycle among the factory providers declared by one module.
fn check_factory_cycles(module: &str, providers: &[Provider]) -> DiResult<()> {
    let nodes: Vec<(Token, Vec<Token>)> = providers
        .iter()
        .filter(|provider| matches!(provider.kind, ProviderKind::Factory(_)))
        .map(|provider| {
            let deps = provider.dependencies.iter().filter_map(Dependency::evaluate).collect();
            (provider.token.clone(), deps)
        })
        .collect();

    match find_factory_cycle(&nodes) {
        Some(cycle) => Err(DiError::CircularFactoryProvider {
            module: module.to_string(),
            path: cycle.iter().map(Token::display_name).collect(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(root: ModuleDefinition, declared: Vec<ModuleDefinition>) -> DiResult<ScannedGraph> {
        let mut builder = ModuleGraphBuilder::default();
        for module in declared {
            builder.declare(module);
        }
        futures::executor::block_on(builder.scan(root))
    }

    #[test]
    fn test_diamond_registers_once() {
        let shared = ModuleDefinition::new("Shared");
        let scanned = scan(
            ModuleDefinition::new("App").import("Left").import("Right"),
            vec![
                ModuleDefinition::new("Left").import("Shared"),
                ModuleDefinition::new("Right").import("Shared"),
                shared,
            ],
        )
        .unwrap();

        let names: Vec<&str> = scanned.graph.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec![INTERNAL_CORE_MODULE, "App", "Left", "Shared", "Right"]);
    }

    #[test]
    fn test_raw_cycle_rejected_with_path() {
        let err = scan(
            ModuleDefinition::new("A").import("B"),
            vec![ModuleDefinition::new("B").import("A")],
        )
        .err()
        .unwrap();
        match err {
            DiError::InvalidModule { path } => assert_eq!(path, vec!["A", "B", "A"]),
            other => panic!("expected InvalidModule, got {}", other),
        }
    }

    #[test]
    fn test_forward_import_breaks_cycle() {
        let scanned = scan(
            ModuleDefinition::new("A").import("B"),
            vec![ModuleDefinition::new("B").import_forward(|| Some("A".to_string()))],
        )
        .unwrap();
        let a = scanned.graph.find("A").unwrap();
        let b = scanned.graph.find("B").unwrap();
        assert!(scanned.graph.module(b).imports().contains(&a));
        assert!(scanned.graph.module(a).imports().contains(&b));
    }

    #[test]
    fn test_undefined_forward_import() {
        let err = scan(ModuleDefinition::new("A").import_forward(|| None), vec![]).err().unwrap();
        assert!(matches!(err, DiError::UndefinedForwardRef { index: 0, .. }));
    }

    #[test]
    fn test_unknown_module() {
        let err = scan(ModuleDefinition::new("A").import("Missing"), vec![]).err().unwrap();
        assert!(matches!(err, DiError::UnknownModule { ref name, ref importer } if name == "Missing" && importer == "A"));
    }

    #[test]
    fn test_unknown_export() {
        let err = scan(ModuleDefinition::new("A").export("NOPE"), vec![]).err().unwrap();
        assert!(matches!(err, DiError::UnknownExport { ref token, .. } if token == "NOPE"));

        let err = scan(ModuleDefinition::new("A").reexport("B"), vec![ModuleDefinition::new("B")])
            .err()
            .unwrap();
        assert!(matches!(err, DiError::UnknownExport { ref token, .. } if token == "B"));
    }

    #[test]
    fn test_global_modules_bound_everywhere() {
        let scanned = scan(
            ModuleDefinition::new("App").import("Feature").import("Config"),
            vec![
                ModuleDefinition::new("Feature"),
                ModuleDefinition::new("Config").global(),
            ],
        )
        .unwrap();
        let feature = scanned.graph.find("Feature").unwrap();
        let config = scanned.graph.find("Config").unwrap();
        assert!(scanned.graph.module(feature).imports().contains(&config));
        assert_eq!(scanned.graph.module(config).distance(), usize::MAX);
        assert_eq!(scanned.graph.module(scanned.graph.root().unwrap()).distance(), 1);
    }

    #[test]
    fn test_reregistration_replaces_binding() {
        let scanned = scan(
            ModuleDefinition::new("App")
                .provider(Provider::value("CONFIG", 1u8))
                .provider(Provider::value("CONFIG", 2u8)),
            vec![],
        )
        .unwrap();
        let app = scanned.graph.root().unwrap();
        let id = scanned.graph.lookup(app, &Token::named("CONFIG")).unwrap();
        match &scanned.wrappers[id.0].kind {
            WrapperKind::Provider(ProviderKind::Value(value)) => assert_eq!(value.downcast_ref::<u8>(), Some(&2)),
            _ => panic!("expected a value provider"),
        }
    }

    #[test]
    fn test_factory_cycle_rejected() {
        let factory = |token: &str, dep: &str| {
            Provider::factory(token, |_deps| async { Ok(()) }).inject(dep)
        };
        let err = scan(
            ModuleDefinition::new("App")
                .provider(factory("PROVIDER1", "PROVIDER2"))
                .provider(factory("PROVIDER2", "PROVIDER3"))
                .provider(factory("PROVIDER3", "PROVIDER1")),
            vec![],
        )
        .err()
        .unwrap();
        assert_eq!(
            err.to_string(),
            "Circular dependency between factory providers in module \"App\": PROVIDER1 -> PROVIDER2 -> PROVIDER3 -> PROVIDER1"
        );
    }

    #[test]
    fn test_unknown_dependency_recorded_on_consumer() {
        let scanned = scan(
            ModuleDefinition::new("App").provider(
                Provider::factory("SERVICE", |_deps| async { Ok(()) })
                    .inject("LOGGER")
                    .inject("MISSING"),
            )
            .provider(Provider::value("LOGGER", ())),
            vec![],
        )
        .unwrap();
        let app = scanned.graph.root().unwrap();
        let id = scanned.graph.lookup(app, &Token::named("SERVICE")).unwrap();
        let error = scanned.wrappers[id.0].link_error.clone().unwrap();
        assert_eq!(
            error.to_string(),
            "Cannot resolve dependencies of SERVICE (LOGGER, ?). Please make sure that the argument \"MISSING\" at index [1] is available in the App context."
        );
    }
}
