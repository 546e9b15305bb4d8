//! Internal disposal bag for singleton teardown hooks.

use futures::future::BoxFuture;

use crate::provider::{AnyArc, DestroyHook};

/// Teardown hooks with LIFO execution order.
///
/// Hooks are pushed as instances finish construction, so dependents run
/// before the dependencies they were built from.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<(String, DestroyHook, AnyArc)>,
}

impl DisposeBag {
    pub(crate) fn push(&mut self, name: String, hook: DestroyHook, instance: AnyArc) {
        self.hooks.push((name, hook, instance));
    }

    /// Drains the bag into futures in reverse registration order.
    pub(crate) fn drain_reverse(&mut self) -> Vec<(String, BoxFuture<'static, ()>)> {
        let mut hooks = std::mem::take(&mut self.hooks);
        hooks.reverse();
        hooks
            .into_iter()
            .map(|(name, hook, instance)| (name, hook(instance)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_hooks_run_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            let hook: DestroyHook = Arc::new(move |_instance| {
                let log = log.clone();
                async move { log.lock().push(name) }.boxed()
            });
            bag.push(name.to_string(), hook, Arc::new(()));
        }
        assert_eq!(bag.len(), 3);

        for (_, hook) in bag.drain_reverse() {
            hook.await;
        }
        assert!(bag.is_empty());
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }
}
