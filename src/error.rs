//! Error types for the dependency injection container.

use std::fmt;
use std::sync::Arc;

/// Shared, clonable error source used for failures raised by user code.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Location of a dependency inside its consumer's declaration.
///
/// Constructor and factory dependencies are positional; property injections
/// are addressed by key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DependencyIndex {
    /// Positional constructor or factory argument
    Position(usize),
    /// Property injection key
    Property(String),
}

impl fmt::Display for DependencyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyIndex::Position(index) => write!(f, "index [{}]", index),
            DependencyIndex::Property(key) => write!(f, "property \"{}\"", key),
        }
    }
}

/// Dependency injection errors
///
/// Every error raised while registering modules, linking providers or
/// resolving instances. None of them are retried by the container: they
/// describe a defect in the declared graph or a failure of user code.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::DiError;
///
/// let cycle = DiError::InvalidModule { path: vec!["A".into(), "B".into(), "A".into()] };
/// assert!(cycle.to_string().contains("A -> B -> A"));
///
/// let depth = DiError::DepthExceeded(1024);
/// assert_eq!(depth.to_string(), "Max resolution depth 1024 exceeded");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiError {
    /// Raw circular module import without a forward reference on any edge
    #[error("Invalid module graph: circular import {} (wrap one of the imports in a forward reference)", .path.join(" -> "))]
    InvalidModule { path: Vec<String> },

    /// An import names a module that was never declared
    #[error("Module \"{name}\" imported by \"{importer}\" has not been declared")]
    UnknownModule { name: String, importer: String },

    /// A forward module reference evaluated to nothing
    #[error("Module \"{importer}\" has an import at index [{index}] whose forward reference is undefined")]
    UndefinedForwardRef { importer: String, index: usize },

    /// A dependency token is not provided by the module or any exporting import
    #[error("Cannot resolve dependencies of {consumer} ({signature}). Please make sure that the argument \"{token}\" at {index} is available in the {module} context.")]
    UnknownDependencies {
        consumer: String,
        signature: String,
        token: String,
        index: DependencyIndex,
        module: String,
    },

    /// A dependency forward reference evaluated to no token
    #[error("Cannot resolve dependencies of {consumer} ({signature}). The argument at {index} is undefined in the {module} context; check forward references for load-order cycles.")]
    UndefinedDependency {
        consumer: String,
        signature: String,
        index: DependencyIndex,
        module: String,
    },

    /// Runtime self-reference along one resolution path
    #[error("Circular dependency: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// Cycle among factory providers' inject lists
    #[error("Circular dependency between factory providers in module \"{module}\": {}", .path.join(" -> "))]
    CircularFactoryProvider { module: String, path: Vec<String> },

    /// An export names neither a provider nor an imported module
    #[error("Module \"{module}\" exports \"{token}\" which is neither one of its providers nor an imported module")]
    UnknownExport { module: String, token: String },

    /// No module provides the requested token
    #[error("No provider for \"{token}\" was found in the container")]
    UnknownElement { token: String },

    /// `get` used on a provider that is not a static singleton
    #[error("\"{token}\" is request or transient scoped and can't be used with get(); use resolve() instead")]
    InvalidScope { token: String },

    /// Resolved instance has a different type than requested
    #[error("Type mismatch for \"{token}\": expected {expected}")]
    TypeMismatch { token: String, expected: &'static str },

    /// A constructor or factory failed
    #[error("Failed to instantiate \"{token}\" (resolution chain: {}): {source}", .chain.join(" -> "))]
    InstantiationFailed {
        token: String,
        chain: Vec<String>,
        #[source]
        source: BoxError,
    },

    /// Maximum recursion depth exceeded
    #[error("Max resolution depth {0} exceeded")]
    DepthExceeded(usize),

    /// Error raised by user code inside a constructor or factory
    #[error(transparent)]
    Custom(BoxError),
}

impl DiError {
    /// Wraps an arbitrary error raised by a constructor or factory.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DiError::Custom(Arc::new(error))
    }

    /// Builds a [`DiError::Custom`] from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        DiError::Custom(Arc::new(Message(message.into())))
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;
