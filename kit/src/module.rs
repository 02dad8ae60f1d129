use crate::route::{Middleware, Route};
use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;

/// Result returned from `Module::init`.
pub type InitResult = Result<(), Box<dyn StdError + Send + Sync>>;

/// A self-contained unit of routes, middleware and init logic with named
/// dependencies on other modules.
///
/// `routes` and `middleware` are read after `init` has run, so modules can
/// bind state created during initialization into their handlers.
pub trait Module: Send + Sync + 'static {
    /// Unique name within a kit.
    fn name(&self) -> &str;

    fn routes(&self) -> Vec<Route> {
        Vec::new()
    }

    fn middleware(&self) -> Vec<Middleware> {
        Vec::new()
    }

    /// Names of the modules that must be initialized before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called exactly once at mount time, after every dependency.
    fn init(&mut self, deps: &Dependencies<'_>) -> InitResult;

    fn as_any(&self) -> &dyn Any;
}

/// The already-initialized modules a module asked for, keyed by name.
pub struct Dependencies<'a> {
    modules: HashMap<&'a str, &'a dyn Module>,
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(modules: HashMap<&'a str, &'a dyn Module>) -> Self {
        Self { modules }
    }

    pub fn get(&self, name: &str) -> Option<&'a dyn Module> {
        self.modules.get(name).copied()
    }

    /// Looks up a dependency and downcasts it to its concrete module type.
    pub fn get_as<T: Module>(&self, name: &str) -> Option<&'a T> {
        self.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
