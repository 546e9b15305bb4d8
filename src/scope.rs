//! Provider scopes.

/// Provider scopes controlling instance caching behavior
///
/// - **Singleton**: one instance for the container's lifetime, stored under the
///   static context
/// - **Request**: one instance per [`ContextId`](crate::ContextId), released with it
/// - **Transient**: one instance per inquirer (the consumer that requested it)
///
/// A provider declared `Singleton` still behaves per-request when anything in
/// its dependency tree is `Request` scoped.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::Scope;
///
/// assert_eq!(Scope::default(), Scope::Singleton);
/// assert!(Scope::Transient.is_transient());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Scope {
    /// Single instance cached forever under the static context
    #[default]
    Singleton,
    /// Fresh instance for each inquirer, reused by that inquirer within one context
    Transient,
    /// Single instance per context id
    Request,
}

impl Scope {
    pub fn is_transient(self) -> bool {
        self == Scope::Transient
    }

    pub fn is_request(self) -> bool {
        self == Scope::Request
    }
}
