//! Instance wrappers: the lifecycle record of one (module, token) binding.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::context::{ContextId, InquirerId};
use crate::error::DependencyIndex;
use crate::module::ModuleId;
use crate::provider::{AnyArc, DestroyHook, Dependency, Provider, ProviderKind};
use crate::{DiError, DiResult, Scope, Token};

/// Arena index of an instance wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(pub(crate) usize);

impl WrapperId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Single-flight cell holding one instance.
///
/// The first caller runs the construction; concurrent callers wait for it.
/// A failed construction leaves the slot empty.
#[derive(Default)]
pub struct InstanceSlot {
    cell: tokio::sync::OnceCell<AnyArc>,
}

impl InstanceSlot {
    pub fn instance(&self) -> Option<AnyArc> {
        self.cell.get().cloned()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }

    pub(crate) async fn get_or_try_init<F, Fut>(&self, init: F) -> DiResult<AnyArc>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DiResult<AnyArc>>,
    {
        self.cell.get_or_try_init(init).await.cloned()
    }
}

impl fmt::Debug for InstanceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSlot")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// What a wrapper produces.
pub(crate) enum WrapperKind {
    Provider(ProviderKind),
    /// Ordered members of a multi-provider token
    Multi(Vec<WrapperId>),
    /// Handle onto the host module
    ModuleRef,
    /// The request payload of the current context
    Request,
}

impl WrapperKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            WrapperKind::Provider(kind) => kind.name(),
            WrapperKind::Multi(_) => "multi",
            WrapperKind::ModuleRef => "module-ref",
            WrapperKind::Request => "request",
        }
    }
}

/// Declared dependency resolved to the wrapper that provides it.
///
/// `target` is `None` for an absent optional dependency.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) index: DependencyIndex,
    pub(crate) token: Option<Token>,
    pub(crate) target: Option<WrapperId>,
}

/// Lifecycle record of one (module, token) binding.
pub struct InstanceWrapper {
    pub(crate) id: WrapperId,
    pub(crate) token: Token,
    pub(crate) name: String,
    pub(crate) host: ModuleId,
    pub(crate) scope: Scope,
    pub(crate) durable: bool,
    pub(crate) is_controller: bool,
    pub(crate) kind: WrapperKind,
    pub(crate) dependencies: Vec<(DependencyIndex, Dependency)>,
    pub(crate) links: Vec<Link>,
    pub(crate) link_error: Option<DiError>,
    pub(crate) on_destroy: Option<DestroyHook>,
    tree_static: OnceCell<bool>,
    tree_durable: OnceCell<bool>,
    static_slots: Mutex<AHashMap<Option<InquirerId>, Arc<InstanceSlot>>>,
}

impl InstanceWrapper {
    pub(crate) fn from_provider(id: WrapperId, host: ModuleId, provider: Provider, is_controller: bool) -> Self {
        let name = provider.name();
        let dependencies = provider.indexed_dependencies();
        let mut wrapper = Self::builtin(id, host, provider.token, WrapperKind::Provider(provider.kind), provider.scope);
        wrapper.name = name;
        wrapper.durable = provider.durable;
        wrapper.is_controller = is_controller;
        wrapper.dependencies = dependencies;
        wrapper.on_destroy = provider.on_destroy;
        wrapper
    }

    pub(crate) fn builtin(id: WrapperId, host: ModuleId, token: Token, kind: WrapperKind, scope: Scope) -> Self {
        Self {
            id,
            name: token.display_name(),
            token,
            host,
            scope,
            durable: false,
            is_controller: false,
            kind,
            dependencies: Vec::new(),
            links: Vec::new(),
            link_error: None,
            on_destroy: None,
            tree_static: OnceCell::new(),
            tree_durable: OnceCell::new(),
            static_slots: Mutex::new(AHashMap::new()),
        }
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> ModuleId {
        self.host
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_controller(&self) -> bool {
        self.is_controller
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_transient(&self) -> bool {
        self.scope.is_transient()
    }

    /// Wrappers this one needs instances of: linked dependencies and, for a
    /// multi token, its members.
    pub(crate) fn children(&self) -> impl Iterator<Item = WrapperId> + '_ {
        let members: &[WrapperId] = match &self.kind {
            WrapperKind::Multi(members) => members,
            _ => &[],
        };
        self.links
            .iter()
            .filter_map(|link| link.target)
            .chain(members.iter().copied())
    }

    /// True iff nothing reachable from this wrapper, itself included, is
    /// request scoped. Memoized once linking is done.
    pub(crate) fn is_dependency_tree_static(&self, arena: &[InstanceWrapper]) -> bool {
        *self
            .tree_static
            .get_or_init(|| self.introspect_static(arena, &mut Vec::new()))
    }

    fn introspect_static(&self, arena: &[InstanceWrapper], registry: &mut Vec<WrapperId>) -> bool {
        if let Some(known) = self.tree_static.get() {
            return *known;
        }
        if self.scope == Scope::Request {
            return false;
        }
        if registry.contains(&self.id) {
            return true;
        }
        registry.push(self.id);
        self.children()
            .all(|child| arena[child.0].introspect_static(arena, registry))
    }

    /// Whether this wrapper belongs to a durable sub-tree.
    ///
    /// A request-scoped wrapper is durable when declared so; a static tree
    /// never is; anything else is durable iff each of its non-static
    /// dependencies is.
    pub(crate) fn is_dependency_tree_durable(&self, arena: &[InstanceWrapper]) -> bool {
        *self
            .tree_durable
            .get_or_init(|| self.introspect_durable(arena, &mut Vec::new()))
    }

    fn introspect_durable(&self, arena: &[InstanceWrapper], registry: &mut Vec<WrapperId>) -> bool {
        if let Some(known) = self.tree_durable.get() {
            return *known;
        }
        if self.scope == Scope::Request {
            return self.durable;
        }
        if self.is_dependency_tree_static(arena) {
            return false;
        }
        if registry.contains(&self.id) {
            return true;
        }
        registry.push(self.id);
        self.children()
            .map(|child| &arena[child.0])
            .filter(|child| !child.is_dependency_tree_static(arena))
            .all(|child| child.introspect_durable(arena, registry))
    }

    /// Whether resolving for (context, inquirer) happens in request scope:
    /// the tree is not static and the context is a real one. A transient
    /// additionally needs a consumer.
    pub(crate) fn is_in_request_scope(
        &self,
        arena: &[InstanceWrapper],
        context: &ContextId,
        inquirer: Option<InquirerId>,
    ) -> bool {
        !self.is_dependency_tree_static(arena)
            && !context.is_static()
            && (!self.is_transient() || inquirer.is_some())
    }

    /// Slot for (context, inquirer), created empty when absent.
    ///
    /// Static-tree instances live on the wrapper itself; request instances
    /// live in the context id's own store. Only transient wrappers key by
    /// inquirer.
    pub(crate) fn instance_slot(
        &self,
        arena: &[InstanceWrapper],
        context: &ContextId,
        inquirer: Option<InquirerId>,
    ) -> Arc<InstanceSlot> {
        let inquirer = if self.is_transient() { inquirer } else { None };
        // Transients live with their context even when the tree is static
        let per_context = !context.is_static() && self.is_transient();
        if per_context || self.is_in_request_scope(arena, context, inquirer) {
            return context.slot(self.id, inquirer);
        }
        self.static_slots.lock().entry(inquirer).or_default().clone()
    }

    /// Instance already created for (context, inquirer), if any.
    pub(crate) fn instance_by_context(
        &self,
        arena: &[InstanceWrapper],
        context: &ContextId,
        inquirer: Option<InquirerId>,
    ) -> Option<AnyArc> {
        self.instance_slot(arena, context, inquirer).instance()
    }

    /// Signature shown in dependency errors, with `?` at `failed`.
    pub(crate) fn signature(&self, failed: &DependencyIndex) -> String {
        self.dependencies
            .iter()
            .filter(|(index, _)| matches!(index, DependencyIndex::Position(_)))
            .map(|(index, dependency)| {
                if index == failed {
                    "?".to_string()
                } else {
                    dependency.describe()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("host", &self.host)
            .field("scope", &self.scope)
            .field("durable", &self.durable)
            .field("kind", &self.kind.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(id: usize, scope: Scope, children: &[usize]) -> InstanceWrapper {
        let mut w = InstanceWrapper::builtin(
            WrapperId(id),
            ModuleId(0),
            Token::named(format!("W{}", id)),
            WrapperKind::Provider(ProviderKind::Value(Arc::new(id))),
            scope,
        );
        w.links = children
            .iter()
            .enumerate()
            .map(|(i, child)| Link {
                index: DependencyIndex::Position(i),
                token: Some(Token::named(format!("W{}", child))),
                target: Some(WrapperId(*child)),
            })
            .collect();
        w
    }

    #[test]
    fn test_static_tree_detection() {
        // 0 -> 1 -> 2(request); 3 has no dependencies
        let arena = vec![
            wrapper(0, Scope::Singleton, &[1]),
            wrapper(1, Scope::Singleton, &[2]),
            wrapper(2, Scope::Request, &[]),
            wrapper(3, Scope::Singleton, &[]),
        ];
        assert!(!arena[0].is_dependency_tree_static(&arena));
        assert!(!arena[1].is_dependency_tree_static(&arena));
        assert!(!arena[2].is_dependency_tree_static(&arena));
        assert!(arena[3].is_dependency_tree_static(&arena));
    }

    #[test]
    fn test_static_tree_terminates_on_cycles() {
        // 0 <-> 1, 1 -> 2(request)
        let arena = vec![
            wrapper(0, Scope::Singleton, &[1]),
            wrapper(1, Scope::Singleton, &[0, 2]),
            wrapper(2, Scope::Request, &[]),
        ];
        assert!(!arena[1].is_dependency_tree_static(&arena));
        assert!(!arena[0].is_dependency_tree_static(&arena));
    }

    #[test]
    fn test_durable_tree_rules() {
        let mut durable_request = wrapper(1, Scope::Request, &[]);
        durable_request.durable = true;
        let arena = vec![
            wrapper(0, Scope::Singleton, &[1, 3]),
            durable_request,
            wrapper(2, Scope::Request, &[]),
            wrapper(3, Scope::Singleton, &[]),
            wrapper(4, Scope::Singleton, &[1, 2]),
        ];
        assert!(arena[0].is_dependency_tree_durable(&arena));
        assert!(arena[1].is_dependency_tree_durable(&arena));
        assert!(!arena[2].is_dependency_tree_durable(&arena));
        assert!(!arena[3].is_dependency_tree_durable(&arena));
        assert!(!arena[4].is_dependency_tree_durable(&arena));
    }

    #[test]
    fn test_instance_slot_placement() {
        let arena = vec![
            wrapper(0, Scope::Singleton, &[]),
            wrapper(1, Scope::Request, &[]),
            wrapper(2, Scope::Transient, &[]),
        ];
        let ctx = ContextId::new();
        let inquirer = Some(InquirerId::Wrapper(WrapperId(9)));

        let singleton = arena[0].instance_slot(&arena, &ctx, None);
        assert!(Arc::ptr_eq(
            &singleton,
            &arena[0].instance_slot(&arena, &ContextId::static_context(), None)
        ));

        arena[1].instance_slot(&arena, &ctx, None);
        arena[2].instance_slot(&arena, &ctx, inquirer);
        assert_eq!(ctx.instance_count(), 2);

        let other = arena[2].instance_slot(&arena, &ctx, Some(InquirerId::Wrapper(WrapperId(8))));
        assert!(!Arc::ptr_eq(&other, &arena[2].instance_slot(&arena, &ctx, inquirer)));
    }

    #[test]
    fn test_request_scope_detection() {
        let arena = vec![
            wrapper(0, Scope::Singleton, &[]),
            wrapper(1, Scope::Request, &[]),
            wrapper(2, Scope::Transient, &[1]),
        ];
        let fresh = ContextId::new();
        let stat = ContextId::static_context();
        let inquirer = Some(InquirerId::Wrapper(WrapperId(9)));

        assert!(!arena[0].is_in_request_scope(&arena, &fresh, None));
        assert!(!arena[1].is_in_request_scope(&arena, &stat, None));
        assert!(arena[1].is_in_request_scope(&arena, &fresh, None));

        assert!(arena[2].is_in_request_scope(&arena, &fresh, inquirer));
        assert!(!arena[2].is_in_request_scope(&arena, &fresh, None));
    }

    #[tokio::test]
    async fn test_slot_does_not_cache_failures() {
        let slot = InstanceSlot::default();
        let failed = slot
            .get_or_try_init(|| async { Err(DiError::msg("boom")) })
            .await;
        assert!(failed.is_err());
        assert!(!slot.is_resolved());

        let value = slot
            .get_or_try_init(|| async { Ok(Arc::new(5u8) as AnyArc) })
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<u8>(), Some(&5));
        assert!(slot.is_resolved());
    }
}
