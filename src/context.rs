//! Context ids and durable sub-tree strategies.
//!
//! Every resolution runs inside a [`ContextId`]. Singletons live under the
//! static context; request-scoped instances live inside the context id that
//! created them and are released together with its last handle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;

use crate::provider::AnyArc;
use crate::wrapper::{InstanceSlot, WrapperId};
use crate::Token;

/// Name of the built-in token resolving to the current request payload.
///
/// Depending on it makes a consumer request scoped.
pub const REQUEST: &str = "REQUEST";

/// Identifier reserved for the static context.
pub const STATIC_CONTEXT_ID: u64 = 1;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(STATIC_CONTEXT_ID + 1);
static NEXT_INQUIRER_ID: AtomicU64 = AtomicU64::new(1);

static STATIC_CONTEXT: Lazy<ContextId> = Lazy::new(|| ContextId::with_id(STATIC_CONTEXT_ID, None));

/// The consumer on whose behalf an instance is created.
///
/// Transient providers are cached per inquirer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InquirerId {
    /// A provider or controller of the container
    Wrapper(WrapperId),
    /// A caller outside the container
    External(u64),
}

impl InquirerId {
    /// Allocates a new external inquirer identity.
    pub fn external() -> Self {
        InquirerId::External(NEXT_INQUIRER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type SlotKey = (WrapperId, Option<InquirerId>);

struct ContextInner {
    id: u64,
    payload: Option<AnyArc>,
    resolver: OnceCell<ContextIdResolver>,
    instances: Mutex<AHashMap<SlotKey, Arc<InstanceSlot>>>,
}

/// Handle identifying one instantiation sub-tree.
///
/// Clones share identity; equality and hashing use the numeric id. The
/// per-context instance store is owned by the handle, so request-scoped
/// instances are dropped together with the last clone.
///
/// # Examples
///
/// ```
/// use ferrous_inject::ContextId;
///
/// let a = ContextId::new();
/// let b = ContextId::new();
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// assert!(ContextId::static_context().is_static());
/// ```
#[derive(Clone)]
pub struct ContextId {
    inner: Arc<ContextInner>,
}

impl ContextId {
    /// Allocates a fresh context id without a request payload.
    pub fn new() -> Self {
        Self::with_id(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed), None)
    }

    /// Allocates a fresh context id carrying a request payload.
    pub fn with_payload(payload: AnyArc) -> Self {
        Self::with_id(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed), Some(payload))
    }

    fn with_id(id: u64, payload: Option<AnyArc>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id,
                payload,
                resolver: OnceCell::new(),
                instances: Mutex::new(AHashMap::new()),
            }),
        }
    }

    /// The reserved context holding singletons.
    pub fn static_context() -> Self {
        STATIC_CONTEXT.clone()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_static(&self) -> bool {
        self.inner.id == STATIC_CONTEXT_ID
    }

    pub fn payload(&self) -> Option<&AnyArc> {
        self.inner.payload.as_ref()
    }

    pub fn resolver(&self) -> Option<&ContextIdResolver> {
        self.inner.resolver.get()
    }

    /// Number of instance slots created in this context.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.lock().len()
    }

    pub(crate) fn set_resolver(&self, resolver: ContextIdResolver) {
        let _ = self.inner.resolver.set(resolver);
    }

    /// Context id a host component is instantiated in: the resolver's choice
    /// when a strategy remapped this context, this context otherwise.
    pub(crate) fn resolve_for(&self, host: &HostComponentInfo) -> ContextId {
        self.resolver()
            .and_then(|resolver| resolver.resolve(host))
            .unwrap_or_else(|| self.clone())
    }

    pub(crate) fn slot(&self, wrapper: WrapperId, inquirer: Option<InquirerId>) -> Arc<InstanceSlot> {
        self.inner
            .instances
            .lock()
            .entry((wrapper, inquirer))
            .or_default()
            .clone()
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ContextId {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ContextId {}

impl Hash for ContextId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static() {
            f.write_str("ContextId(static)")
        } else {
            write!(f, "ContextId({})", self.inner.id)
        }
    }
}

/// What a [`ContextIdResolver`] is told about the component being created.
#[derive(Debug, Clone)]
pub struct HostComponentInfo {
    pub token: Token,
    /// Whether the component's dependency tree is durable
    pub is_tree_durable: bool,
}

type ResolveFn = Arc<dyn Fn(&HostComponentInfo) -> Option<ContextId> + Send + Sync>;

/// Per-request remapping installed by a [`ContextIdStrategy`].
///
/// `resolve` returns the context id a component should be created in, or
/// `None` to keep the per-request one. The payload replaces the request
/// payload seen by components of a durable tree.
#[derive(Clone)]
pub struct ContextIdResolver {
    resolve: ResolveFn,
    payload: Option<AnyArc>,
}

impl ContextIdResolver {
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&HostComponentInfo) -> Option<ContextId> + Send + Sync + 'static,
    {
        Self {
            resolve: Arc::new(resolve),
            payload: None,
        }
    }

    /// Resolver sending every durable tree to `durable` and keeping the rest
    /// per request.
    pub fn durable(durable: ContextId) -> Self {
        Self::new(move |host| host.is_tree_durable.then(|| durable.clone()))
    }

    pub fn with_payload<T: Send + Sync + 'static>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn payload(&self) -> Option<&AnyArc> {
        self.payload.as_ref()
    }

    pub fn resolve(&self, host: &HostComponentInfo) -> Option<ContextId> {
        (self.resolve)(host)
    }
}

impl fmt::Debug for ContextIdResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextIdResolver")
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Pluggable policy mapping requests onto durable sub-trees.
///
/// `attach` is called exactly once per context id created through
/// [`ContextIdFactory::for_request`]. The strategy owns the durable context
/// ids it hands out; the container never evicts them.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{AnyArc, ContextId, ContextIdResolver, ContextIdStrategy};
/// use parking_lot::Mutex;
/// use std::collections::HashMap;
///
/// struct TenantRequest { tenant: String }
///
/// #[derive(Default)]
/// struct PerTenant {
///     tenants: Mutex<HashMap<String, ContextId>>,
/// }
///
/// impl ContextIdStrategy for PerTenant {
///     fn attach(&self, _context_id: &ContextId, request: &AnyArc) -> Option<ContextIdResolver> {
///         let tenant = request.downcast_ref::<TenantRequest>()?.tenant.clone();
///         let durable = self.tenants.lock().entry(tenant.clone()).or_default().clone();
///         Some(ContextIdResolver::durable(durable).with_payload(tenant))
///     }
/// }
/// ```
pub trait ContextIdStrategy: Send + Sync {
    fn attach(&self, context_id: &ContextId, request: &AnyArc) -> Option<ContextIdResolver>;
}

/// Creates context ids for a container.
#[derive(Clone, Default)]
pub struct ContextIdFactory {
    strategy: Option<Arc<dyn ContextIdStrategy>>,
}

impl ContextIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(strategy: Arc<dyn ContextIdStrategy>) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }

    /// Allocates a fresh context id with no request attached.
    pub fn create(&self) -> ContextId {
        ContextId::new()
    }

    /// Allocates a context id for a request and lets the installed strategy
    /// attach a resolver to it.
    pub fn for_request<T: Send + Sync + 'static>(&self, request: T) -> ContextId {
        let payload: AnyArc = Arc::new(request);
        let context_id = ContextId::with_payload(payload.clone());
        if let Some(strategy) = &self.strategy {
            if let Some(resolver) = strategy.attach(&context_id, &payload) {
                context_id.set_resolver(resolver);
            }
        }
        context_id
    }

    pub fn has_strategy(&self) -> bool {
        self.strategy.is_some()
    }
}

impl fmt::Debug for ContextIdFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextIdFactory")
            .field("has_strategy", &self.strategy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_context_ids_are_unique_and_not_static() {
        let factory = ContextIdFactory::new();
        let a = factory.create();
        let b = factory.create();
        assert_ne!(a, b);
        assert!(!a.is_static());
        assert_eq!(ContextId::static_context(), ContextId::static_context());
        assert_eq!(ContextId::static_context().id(), STATIC_CONTEXT_ID);
    }

    #[test]
    fn test_slots_are_shared_per_key() {
        let ctx = ContextId::new();
        let a = ctx.slot(WrapperId(3), None);
        let b = ctx.slot(WrapperId(3), None);
        let c = ctx.slot(WrapperId(3), Some(InquirerId::Wrapper(WrapperId(1))));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(ctx.instance_count(), 2);
    }

    struct CountingStrategy {
        calls: AtomicUsize,
        durable: ContextId,
    }

    impl ContextIdStrategy for CountingStrategy {
        fn attach(&self, _context_id: &ContextId, request: &AnyArc) -> Option<ContextIdResolver> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tenant = request.downcast_ref::<&'static str>()?;
            Some(ContextIdResolver::durable(self.durable.clone()).with_payload(tenant.to_string()))
        }
    }

    #[test]
    fn test_strategy_attaches_once_per_request() {
        let durable = ContextId::new();
        let strategy = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
            durable: durable.clone(),
        });
        let factory = ContextIdFactory::with_strategy(strategy.clone());

        let ctx = factory.for_request("tenant-a");
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);

        let durable_host = HostComponentInfo {
            token: Token::named("TENANT_DB"),
            is_tree_durable: true,
        };
        let plain_host = HostComponentInfo {
            token: Token::named("LOGGER"),
            is_tree_durable: false,
        };
        assert_eq!(ctx.resolve_for(&durable_host), durable);
        assert_eq!(ctx.resolve_for(&plain_host), ctx);

        let payload = ctx.resolver().and_then(|r| r.payload()).unwrap();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "tenant-a");
    }

    #[test]
    fn test_without_strategy_context_resolves_to_itself() {
        let factory = ContextIdFactory::new();
        let ctx = factory.for_request(42u32);
        let host = HostComponentInfo {
            token: Token::named("ANY"),
            is_tree_durable: true,
        };
        assert_eq!(ctx.resolve_for(&host), ctx);
        assert_eq!(ctx.payload().unwrap().downcast_ref::<u32>(), Some(&42));
    }
}
