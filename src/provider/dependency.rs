//! Dependency declarations and forward references.

use std::fmt;
use std::sync::Arc;

use crate::Token;

/// Lazy thunk yielding a token once every module has been registered.
///
/// Returning `None` models a reference that is still undefined at link time;
/// the consumer then fails with [`DiError::UndefinedDependency`](crate::DiError::UndefinedDependency).
#[derive(Clone)]
pub struct ForwardRef(Arc<dyn Fn() -> Option<Token> + Send + Sync>);

impl ForwardRef {
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn() -> Option<Token> + Send + Sync + 'static,
    {
        ForwardRef(Arc::new(thunk))
    }

    pub(crate) fn evaluate(&self) -> Option<Token> {
        (self.0)()
    }
}

impl fmt::Debug for ForwardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForwardRef(..)")
    }
}

/// What a dependency points at.
#[derive(Clone, Debug)]
pub enum DependencyTarget {
    Token(Token),
    Forward(ForwardRef),
}

/// One entry in a provider's dependency list.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{forward_ref, Dependency, Token};
///
/// struct Database;
///
/// let direct: Dependency = Token::of::<Database>().into();
/// let lazy = forward_ref(|| Some(Token::of::<Database>()));
/// let maybe = Dependency::from("CACHE").optional();
/// assert!(maybe.is_optional());
/// assert!(!direct.is_optional() && !lazy.is_optional());
/// ```
#[derive(Clone, Debug)]
pub struct Dependency {
    target: DependencyTarget,
    optional: bool,
}

impl Dependency {
    pub fn token(token: impl Into<Token>) -> Self {
        Self {
            target: DependencyTarget::Token(token.into()),
            optional: false,
        }
    }

    pub fn forward(forward: ForwardRef) -> Self {
        Self {
            target: DependencyTarget::Forward(forward),
            optional: false,
        }
    }

    /// Resolve to `None` instead of failing when no module provides the token.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn target(&self) -> &DependencyTarget {
        &self.target
    }

    /// Evaluates the target; forward references run their thunk.
    pub(crate) fn evaluate(&self) -> Option<Token> {
        match &self.target {
            DependencyTarget::Token(token) => Some(token.clone()),
            DependencyTarget::Forward(forward) => forward.evaluate(),
        }
    }

    /// Name shown in dependency signatures of error messages.
    pub(crate) fn describe(&self) -> String {
        match self.evaluate() {
            Some(token) => token.display_name(),
            None => "undefined".to_string(),
        }
    }
}

/// Shorthand for a dependency behind a forward reference.
pub fn forward_ref<F>(thunk: F) -> Dependency
where
    F: Fn() -> Option<Token> + Send + Sync + 'static,
{
    Dependency::forward(ForwardRef::new(thunk))
}

impl From<Token> for Dependency {
    fn from(token: Token) -> Self {
        Dependency::token(token)
    }
}

impl From<&Token> for Dependency {
    fn from(token: &Token) -> Self {
        Dependency::token(token.clone())
    }
}

impl From<&str> for Dependency {
    fn from(name: &str) -> Self {
        Dependency::token(Token::named(name))
    }
}

impl From<ForwardRef> for Dependency {
    fn from(forward: ForwardRef) -> Self {
        Dependency::forward(forward)
    }
}
