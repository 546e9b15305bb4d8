//! Injection tokens.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Key naming an injectable.
///
/// - **Type**: a concrete type, compared by `TypeId` (the "class reference")
/// - **Named**: an explicit string key, compared by value
/// - **Symbol**: an opaque key with a unique identity, compared by that identity
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::Token;
///
/// struct Database;
///
/// assert_eq!(Token::of::<Database>(), Token::of::<Database>());
/// assert_eq!(Token::named("CONFIG"), Token::named("CONFIG"));
///
/// // Two symbols never compare equal, even with the same description
/// assert_ne!(Token::symbol("tenant"), Token::symbol("tenant"));
/// ```
#[derive(Clone)]
pub enum Token {
    /// Concrete type key with TypeId and name for diagnostics
    Type(TypeId, &'static str),
    /// String key
    Named(Arc<str>),
    /// Unique key with a description for diagnostics
    Symbol(u64, &'static str),
}

impl Token {
    /// Token for the type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Token for an explicit string key.
    pub fn named(name: impl AsRef<str>) -> Self {
        Token::Named(Arc::from(name.as_ref()))
    }

    /// Allocates a new token with a unique identity.
    pub fn symbol(description: &'static str) -> Self {
        Token::Symbol(NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed), description)
    }

    /// Human-readable name for diagnostics.
    ///
    /// Type tokens use the last path segment of the type name, so
    /// `my_app::users::UsersService` is shown as `UsersService`.
    pub fn display_name(&self) -> String {
        match self {
            Token::Type(_, name) => short_type_name(name),
            Token::Named(name) => name.to_string(),
            Token::Symbol(_, description) => format!("Symbol({})", description),
        }
    }
}

/// Strips module paths from a type name, keeping generic arguments readable.
pub(crate) fn short_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for ch in name.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' => {
                out.push_str(last_segment(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(last_segment(&segment));
    out
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

impl PartialEq for Token {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Type(a, _), Token::Type(b, _)) => a == b,
            (Token::Named(a), Token::Named(b)) => a == b,
            (Token::Symbol(a, _), Token::Symbol(b, _)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Token::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Token::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
            Token::Symbol(id, _) => {
                2u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(_, name) => write!(f, "Type({})", name),
            Token::Named(name) => write!(f, "Named({:?})", name),
            Token::Symbol(id, description) => write!(f, "Symbol({}#{})", description, id),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::named(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Named(Arc::from(name))
    }
}
