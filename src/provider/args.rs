//! Resolved dependency values handed to constructors and factories.

use std::any::Any;
use std::sync::Arc;

use super::{downcast, downcast_all, AnyArc};
use crate::error::DependencyIndex;
use crate::{DiError, DiResult, Token};

/// Positional dependency values of one instantiation.
///
/// Values appear in declaration order. An optional dependency that no module
/// provides is `None`.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{Provider, Token};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let provider = Provider::class::<Database, _>(|deps| {
///     let config = deps.get::<Config>(0)?;
///     Ok(Database { url: config.url.clone() })
/// })
/// .inject(Token::of::<Config>());
/// assert_eq!(provider.dependencies().len(), 1);
/// ```
pub struct ResolvedDeps {
    consumer: Token,
    module: String,
    tokens: Vec<Option<Token>>,
    values: Vec<Option<AnyArc>>,
}

impl ResolvedDeps {
    pub(crate) fn new(
        consumer: Token,
        module: String,
        tokens: Vec<Option<Token>>,
        values: Vec<Option<AnyArc>>,
    ) -> Self {
        Self {
            consumer,
            module,
            tokens,
            values,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(consumer: Token, values: Vec<Option<AnyArc>>) -> Self {
        let tokens = vec![None; values.len()];
        Self::new(consumer, "TestModule".to_string(), tokens, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The provider being instantiated.
    pub fn consumer(&self) -> &Token {
        &self.consumer
    }

    /// Untyped value at `index`.
    pub fn get_any(&self, index: usize) -> Option<&AnyArc> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Typed value at `index`; fails when absent or of another type.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Arc<T>> {
        match self.get_optional::<T>(index)? {
            Some(value) => Ok(value),
            None => Err(self.missing(index)),
        }
    }

    /// Typed value at `index`, `None` for an absent optional dependency.
    pub fn get_optional<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Option<Arc<T>>> {
        match self.values.get(index) {
            Some(Some(value)) => downcast::<T>(value.clone(), self.token_at(index)).map(Some),
            Some(None) => Ok(None),
            None => Err(self.missing(index)),
        }
    }

    /// Every value of a multi provider at `index`, in registration order.
    pub fn get_all<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Vec<Arc<T>>> {
        match self.values.get(index) {
            Some(Some(value)) => downcast_all::<T>(value.clone(), self.token_at(index)),
            Some(None) => Ok(Vec::new()),
            None => Err(self.missing(index)),
        }
    }

    fn token_at(&self, index: usize) -> &Token {
        self.tokens
            .get(index)
            .and_then(Option::as_ref)
            .unwrap_or(&self.consumer)
    }

    fn missing(&self, index: usize) -> DiError {
        let signature = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| match token {
                Some(token) if i != index => token.display_name(),
                _ => "?".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        DiError::UnknownDependencies {
            consumer: self.consumer.display_name(),
            signature,
            token: self
                .tokens
                .get(index)
                .and_then(Option::as_ref)
                .map(Token::display_name)
                .unwrap_or_else(|| "?".to_string()),
            index: DependencyIndex::Position(index),
            module: self.module.clone(),
        }
    }
}
