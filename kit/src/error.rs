//! Error types for the module kit.
use std::error::Error as StdError;
use std::fmt;

/// Error returned by module registration and mounting.
///
/// Follows the same shape as the other crates: a kind enum describing what
/// went wrong plus an optional source holding the underlying cause (only
/// populated for `ModuleInitFailed`).
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: KitErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum KitErrorKind {
    // A module with the same name is already registered
    DuplicateModule(String),
    // A declared dependency is not registered
    UnresolvedDependency { module: String, dependency: String },
    // The dependency graph loops back through this module
    CircularDependency(String),
    // A module's init returned an error
    ModuleInitFailed(String),
    // A route uses a method the router cannot bind
    UnsupportedMethod(String),
    // The kit has already been mounted
    AlreadyMounted,
}

impl Error {
    pub fn new(error_kind: KitErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub(crate) fn init_failed(name: &str, cause: Box<dyn StdError + Send + Sync>) -> Self {
        Self {
            source: Some(cause),
            error_kind: KitErrorKind::ModuleInitFailed(name.to_string()),
        }
    }
}

impl From<KitErrorKind> for Error {
    fn from(error_kind: KitErrorKind) -> Self {
        Self::new(error_kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            KitErrorKind::DuplicateModule(name) => {
                write!(f, "module {name} is already registered")
            }
            KitErrorKind::UnresolvedDependency { module, dependency } => write!(
                f,
                "module {module} depends on {dependency}, which is not registered"
            ),
            KitErrorKind::CircularDependency(name) => {
                write!(f, "circular dependency detected at module {name}")
            }
            KitErrorKind::ModuleInitFailed(name) => match &self.source {
                Some(cause) => write!(f, "module {name} failed to initialize: {cause}"),
                None => write!(f, "module {name} failed to initialize"),
            },
            KitErrorKind::UnsupportedMethod(method) => {
                write!(f, "unsupported HTTP method {method}")
            }
            KitErrorKind::AlreadyMounted => write!(f, "modules have already been mounted"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
