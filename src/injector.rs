//! Depth-first instance resolution.
//!
//! The injector walks linked dependencies with the context id of the
//! original request. Each wrapper picks its effective context (static,
//! per request, or durable) and caches its instance in the single-flight
//! slot for (wrapper, effective context, inquirer).

use std::sync::Arc;
use std::time::Instant;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::trace;

use crate::container::{ContainerInner, ModuleRef};
use crate::context::{ContextId, HostComponentInfo, InquirerId};
use crate::error::DependencyIndex;
use crate::internal::ResolutionPath;
use crate::provider::{AnyArc, MultiInstances, ProviderKind, ResolvedDeps};
use crate::wrapper::{InstanceWrapper, Link, WrapperId, WrapperKind};
use crate::{DiError, DiResult};

/// The consumer an instance is created for, with the context the consumer
/// itself lives in.
#[derive(Debug, Clone)]
pub(crate) struct Inquirer {
    pub(crate) id: InquirerId,
    pub(crate) context: ContextId,
}

#[derive(Clone, Copy)]
pub(crate) struct Injector<'c> {
    container: &'c ContainerInner,
}

impl<'c> Injector<'c> {
    pub(crate) fn new(container: &'c ContainerInner) -> Self {
        Self { container }
    }

    fn arena(self) -> &'c [InstanceWrapper] {
        &self.container.wrappers
    }

    fn wrapper(self, id: WrapperId) -> &'c InstanceWrapper {
        &self.container.wrappers[id.0]
    }

    fn name_of(self, id: WrapperId) -> String {
        self.wrapper(id).name.clone()
    }

    /// Returns the instance of `id` for `inquirer` within `context`,
    /// creating it on a cache miss.
    pub(crate) fn load_instance(
        self,
        id: WrapperId,
        context: ContextId,
        inquirer: Option<Inquirer>,
        path: ResolutionPath,
    ) -> BoxFuture<'c, DiResult<AnyArc>> {
        async move {
            let wrapper = self.wrapper(id);
            if let WrapperKind::Request = wrapper.kind {
                return self.request_payload(wrapper, &context, inquirer.as_ref());
            }

            let effective = self.effective_context(wrapper, &context, inquirer.as_ref())?;
            let slot = wrapper.instance_slot(self.arena(), &effective, inquirer.as_ref().map(|i| i.id));
            if let Some(instance) = slot.instance() {
                return Ok(instance);
            }

            // Checked before waiting on the slot: a cycle would wait on itself.
            let path = path.enter(id, self.container.options.max_resolution_depth, |w| self.name_of(w))?;
            if let Some(error) = &wrapper.link_error {
                return Err(error.clone());
            }

            slot.get_or_try_init(move || self.instantiate(wrapper, context, effective, inquirer, path))
                .await
        }
        .boxed()
    }

    /// Context the instance of `wrapper` is stored in.
    fn effective_context(
        self,
        wrapper: &InstanceWrapper,
        context: &ContextId,
        inquirer: Option<&Inquirer>,
    ) -> DiResult<ContextId> {
        let arena = self.arena();
        if wrapper.is_in_request_scope(arena, context, inquirer.map(|i| i.id)) {
            let host = HostComponentInfo {
                token: wrapper.token.clone(),
                is_tree_durable: wrapper.is_dependency_tree_durable(arena),
            };
            return Ok(context.resolve_for(&host));
        }
        if wrapper.is_dependency_tree_static(arena) {
            if wrapper.is_transient() {
                return Ok(inquirer.map_or_else(|| context.clone(), |i| i.context.clone()));
            }
            return Ok(ContextId::static_context());
        }
        if context.is_static() {
            return Err(DiError::InvalidScope {
                token: wrapper.token.display_name(),
            });
        }
        // Non-static transient with no consumer: keep the caller's context
        Ok(context.clone())
    }

    /// Value of the built-in `REQUEST` token: the strategy's payload for a
    /// consumer moved into a durable context, the request payload otherwise.
    fn request_payload(
        self,
        wrapper: &InstanceWrapper,
        context: &ContextId,
        inquirer: Option<&Inquirer>,
    ) -> DiResult<AnyArc> {
        if context.is_static() {
            return Err(DiError::InvalidScope {
                token: wrapper.token.display_name(),
            });
        }
        let remapped = inquirer.map_or(false, |i| i.context != *context);
        let durable_payload = if remapped {
            context.resolver().and_then(|resolver| resolver.payload())
        } else {
            None
        };
        durable_payload
            .or_else(|| context.payload())
            .cloned()
            .ok_or_else(|| DiError::msg(format!("no request payload is attached to {:?}", context)))
    }

    async fn instantiate(
        self,
        wrapper: &'c InstanceWrapper,
        context: ContextId,
        effective: ContextId,
        inquirer: Option<Inquirer>,
        path: ResolutionPath,
    ) -> DiResult<AnyArc> {
        let observers = &self.container.observers;
        let started = Instant::now();
        trace!(provider = %wrapper.name, context = effective.id(), depth = path.depth(), "instantiating");
        if observers.has_observers() {
            observers.resolving(&wrapper.token, &effective);
        }

        let result = self.construct(wrapper, &context, &effective, inquirer, &path).await;

        match &result {
            Ok(instance) => {
                if observers.has_observers() {
                    observers.resolved(&wrapper.token, &effective, started.elapsed());
                }
                if effective.is_static() {
                    if let Some(hook) = &wrapper.on_destroy {
                        self.container
                            .disposers
                            .lock()
                            .push(wrapper.name.clone(), hook.clone(), instance.clone());
                    }
                }
            }
            Err(error) => {
                trace!(provider = %wrapper.name, %error, "instantiation failed");
                if observers.has_observers() {
                    observers.failed(&wrapper.token, &effective, error);
                }
            }
        }
        result
    }

    async fn construct(
        self,
        wrapper: &'c InstanceWrapper,
        context: &ContextId,
        effective: &ContextId,
        outer: Option<Inquirer>,
        path: &ResolutionPath,
    ) -> DiResult<AnyArc> {
        let inquirer = Inquirer {
            id: InquirerId::Wrapper(wrapper.id),
            context: effective.clone(),
        };

        match &wrapper.kind {
            WrapperKind::Provider(ProviderKind::Value(value)) => Ok(value.clone()),
            WrapperKind::Provider(ProviderKind::Existing(target)) => {
                let values = self.resolve_links(wrapper, is_positional, context, &inquirer, path).await?;
                values
                    .into_iter()
                    .next()
                    .flatten()
                    .ok_or_else(|| DiError::UnknownElement {
                        token: target.display_name(),
                    })
            }
            WrapperKind::Provider(ProviderKind::Class(class)) => {
                let deps = self.resolve_arguments(wrapper, context, &inquirer, path).await?;
                let instance = (class.ctor)(&deps).map_err(|e| self.failure(wrapper, path, e))?;

                let values = self.resolve_links(wrapper, is_property, context, &inquirer, path).await?;
                for (property, value) in class.properties.iter().zip(values) {
                    (property.setter)(&instance, value).map_err(|e| self.failure(wrapper, path, e))?;
                }
                Ok(instance)
            }
            WrapperKind::Provider(ProviderKind::Factory(factory)) => {
                let deps = self.resolve_arguments(wrapper, context, &inquirer, path).await?;
                factory
                    .factory
                    .create(deps)
                    .await
                    .map_err(|e| self.failure(wrapper, path, e))
            }
            WrapperKind::Multi(members) => {
                // Members are created for the aggregate's own consumer.
                let values = try_join_all(
                    members
                        .iter()
                        .map(|member| self.load_instance(*member, context.clone(), outer.clone(), path.clone())),
                )
                .await?;
                Ok(Arc::new(MultiInstances(values)) as AnyArc)
            }
            WrapperKind::ModuleRef => {
                Ok(Arc::new(ModuleRef::new(self.container.handle(), wrapper.host)) as AnyArc)
            }
            WrapperKind::Request => self.request_payload(wrapper, context, outer.as_ref()),
        }
    }

    /// Resolves the selected links concurrently, preserving their order.
    /// Absent optional dependencies yield `None`.
    async fn resolve_links(
        self,
        wrapper: &'c InstanceWrapper,
        select: fn(&DependencyIndex) -> bool,
        context: &ContextId,
        inquirer: &Inquirer,
        path: &ResolutionPath,
    ) -> DiResult<Vec<Option<AnyArc>>> {
        let pending = wrapper
            .links
            .iter()
            .filter(|link| select(&link.index))
            .map(|link: &'c Link| {
                let context = context.clone();
                let inquirer = inquirer.clone();
                let path = path.clone();
                async move {
                    match link.target {
                        Some(target) => self.load_instance(target, context, Some(inquirer), path).await.map(Some),
                        None => Ok(None),
                    }
                }
            });
        try_join_all(pending).await
    }

    async fn resolve_arguments(
        self,
        wrapper: &'c InstanceWrapper,
        context: &ContextId,
        inquirer: &Inquirer,
        path: &ResolutionPath,
    ) -> DiResult<ResolvedDeps> {
        let values = self.resolve_links(wrapper, is_positional, context, inquirer, path).await?;
        let tokens = wrapper
            .links
            .iter()
            .filter(|link| is_positional(&link.index))
            .map(|link| link.token.clone())
            .collect();
        let module = self.container.graph.module(wrapper.host).name().to_string();
        Ok(ResolvedDeps::new(wrapper.token.clone(), module, tokens, values))
    }

    /// Wraps an error raised by user code with the resolution chain.
    fn failure(self, wrapper: &InstanceWrapper, path: &ResolutionPath, error: DiError) -> DiError {
        match error {
            DiError::Custom(source) => DiError::InstantiationFailed {
                token: wrapper.name.clone(),
                chain: path.names(|id| self.name_of(id)),
                source,
            },
            other => other,
        }
    }
}

fn is_positional(index: &DependencyIndex) -> bool {
    matches!(index, DependencyIndex::Position(_))
}

fn is_property(index: &DependencyIndex) -> bool {
    matches!(index, DependencyIndex::Property(_))
}
