//! Registered modules and provider visibility.

use std::fmt;

use ahash::{AHashMap, AHashSet};

use super::Export;
use crate::wrapper::WrapperId;
use crate::Token;

/// Arena index of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered node of the import graph.
pub struct Module {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    pub(crate) global: bool,
    pub(crate) distance: usize,
    pub(crate) providers: AHashMap<Token, WrapperId>,
    pub(crate) controllers: AHashMap<Token, WrapperId>,
    pub(crate) imports: Vec<ModuleId>,
    pub(crate) declared_exports: Vec<Export>,
    pub(crate) exported_tokens: AHashSet<Token>,
    pub(crate) exported_modules: Vec<ModuleId>,
}

impl Module {
    pub(crate) fn new(id: ModuleId, name: String, global: bool) -> Self {
        Self {
            id,
            name,
            global,
            distance: 0,
            providers: AHashMap::new(),
            controllers: AHashMap::new(),
            imports: Vec::new(),
            declared_exports: Vec::new(),
            exported_tokens: AHashSet::new(),
            exported_modules: Vec::new(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Depth of the module in the topology tree; 1 for the root and
    /// `usize::MAX` for global modules.
    pub fn distance(&self) -> usize {
        self.distance
    }

    /// Imported modules in import order, including bound global modules.
    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    pub fn has_provider(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
    }

    pub fn provider_tokens(&self) -> impl Iterator<Item = &Token> {
        self.providers.keys()
    }

    pub fn controller_tokens(&self) -> impl Iterator<Item = &Token> {
        self.controllers.keys()
    }

    pub(crate) fn add_import(&mut self, module: ModuleId) {
        if module != self.id && !self.imports.contains(&module) {
            self.imports.push(module);
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("global", &self.global)
            .field("distance", &self.distance)
            .field("imports", &self.imports)
            .finish()
    }
}

/// Arena of registered modules.
///
/// Immutable once the container is built.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    pub(crate) modules: Vec<Module>,
    pub(crate) by_name: AHashMap<String, ModuleId>,
    pub(crate) root: Option<ModuleId>,
}

impl ModuleGraph {
    pub(crate) fn insert(&mut self, name: &str, global: bool) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(Module::new(id, name.to_string(), global));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }

    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn root(&self) -> Option<ModuleId> {
        self.root
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Every token visible to importers of `module`: its exported providers
    /// plus, recursively, the exports of the modules it re-exports.
    pub fn exported_tokens(&self, module: ModuleId) -> AHashSet<Token> {
        let mut tokens = AHashSet::new();
        let mut visited = AHashSet::new();
        self.collect_exports(module, &mut tokens, &mut visited);
        tokens
    }

    fn collect_exports(&self, module: ModuleId, tokens: &mut AHashSet<Token>, visited: &mut AHashSet<ModuleId>) {
        if !visited.insert(module) {
            return;
        }
        let node = self.module(module);
        tokens.extend(node.exported_tokens.iter().cloned());
        for reexported in &node.exported_modules {
            self.collect_exports(*reexported, tokens, visited);
        }
    }

    /// Finds the wrapper a consumer hosted in `module` receives for `token`.
    ///
    /// The module's own providers win; otherwise imports are searched in
    /// order, descending only into modules that export the token or re-export
    /// the module that does.
    pub fn lookup(&self, module: ModuleId, token: &Token) -> Option<WrapperId> {
        let node = self.module(module);
        if let Some(id) = node.providers.get(token) {
            return Some(*id);
        }
        let mut visited = AHashSet::new();
        visited.insert(module);
        node.imports
            .iter()
            .find_map(|import| self.lookup_exported(*import, token, &mut visited))
    }

    fn lookup_exported(&self, module: ModuleId, token: &Token, visited: &mut AHashSet<ModuleId>) -> Option<WrapperId> {
        if !visited.insert(module) {
            return None;
        }
        let node = self.module(module);
        if node.exported_tokens.contains(token) {
            if let Some(id) = node.providers.get(token) {
                return Some(*id);
            }
        }
        node.exported_modules
            .iter()
            .find_map(|reexported| self.lookup_exported(*reexported, token, visited))
    }

    /// Non-strict search: the root module first, then every module in
    /// registration order. Controllers are included.
    pub fn find_anywhere(&self, token: &Token) -> Option<WrapperId> {
        let own = |module: &Module| {
            module
                .providers
                .get(token)
                .or_else(|| module.controllers.get(token))
                .copied()
        };
        if let Some(found) = self.root.and_then(|root| own(self.module(root))) {
            return Some(found);
        }
        self.modules.iter().find_map(own)
    }

    /// Search scoped to one module's visibility, including its own controllers.
    pub(crate) fn find_in(&self, module: ModuleId, token: &Token) -> Option<WrapperId> {
        self.lookup(module, token)
            .or_else(|| self.module(module).controllers.get(token).copied())
    }
}
