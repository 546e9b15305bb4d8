//! Diagnostic observers for resolution events.
//!
//! Observers see every instance construction the injector performs: cache
//! hits are not reported. They run synchronously on the resolving task, so
//! implementations should stay cheap.

use std::sync::Arc;
use std::time::Duration;

use crate::{ContextId, DiError, Token};

/// Observer trait for instance construction events.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ContextId, DiError, ResolutionObserver, Token};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct CountingObserver {
///     created: AtomicUsize,
/// }
///
/// impl ResolutionObserver for CountingObserver {
///     fn resolved(&self, _token: &Token, _context: &ContextId, _duration: Duration) {
///         self.created.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ResolutionObserver: Send + Sync {
    /// Called before an instance is constructed.
    fn resolving(&self, _token: &Token, _context: &ContextId) {}

    /// Called after an instance was constructed, with the elapsed time.
    fn resolved(&self, _token: &Token, _context: &ContextId, _duration: Duration) {}

    /// Called when constructing an instance failed.
    fn failed(&self, _token: &Token, _context: &ContextId, _error: &DiError) {}
}

/// Container for registered observers.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ResolutionObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ResolutionObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    #[inline]
    pub(crate) fn resolving(&self, token: &Token, context: &ContextId) {
        for observer in &self.observers {
            observer.resolving(token, context);
        }
    }

    #[inline]
    pub(crate) fn resolved(&self, token: &Token, context: &ContextId, duration: Duration) {
        for observer in &self.observers {
            observer.resolved(token, context, duration);
        }
    }

    #[inline]
    pub(crate) fn failed(&self, token: &Token, context: &ContextId, error: &DiError) {
        for observer in &self.observers {
            observer.failed(token, context, error);
        }
    }
}

/// Built-in observer forwarding events to `tracing`.
///
/// Construction start and end are emitted at `TRACE`, failures at `WARN`.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ContainerBuilder, ModuleDefinition, TracingObserver};
///
/// let builder = ContainerBuilder::new(ModuleDefinition::new("AppModule"))
///     .observer(TracingObserver::new());
/// ```
#[derive(Debug, Clone)]
pub struct TracingObserver {
    label: &'static str,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self {
            label: "ferrous_inject",
        }
    }

    /// Observer tagging every event with a custom `label` field.
    pub fn with_label(label: &'static str) -> Self {
        Self { label }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionObserver for TracingObserver {
    fn resolving(&self, token: &Token, context: &ContextId) {
        tracing::trace!(label = self.label, token = %token, context = context.id(), "resolving");
    }

    fn resolved(&self, token: &Token, context: &ContextId, duration: Duration) {
        tracing::trace!(
            label = self.label,
            token = %token,
            context = context.id(),
            elapsed_us = duration.as_micros() as u64,
            "resolved"
        );
    }

    fn failed(&self, token: &Token, context: &ContextId, error: &DiError) {
        tracing::warn!(label = self.label, token = %token, context = context.id(), %error, "resolution failed");
    }
}
