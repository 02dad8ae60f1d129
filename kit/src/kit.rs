use crate::error::{Error, KitErrorKind};
use crate::module::{Dependencies, Module};
use crate::route::{Middleware, Route, Verb};
use crate::router::{self, Router};
use log::*;
use std::collections::{HashMap, HashSet};

/// Fluent configuration for a `Kit`.
pub struct Builder<R: Router> {
    router: R,
    prefix: String,
    banner: bool,
}

impl<R: Router> Builder<R> {
    pub fn new(router: R) -> Self {
        Self {
            router,
            prefix: String::new(),
            banner: false,
        }
    }

    /// Prefix prepended to every mounted route path, e.g. `/api/v1`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Log the list of mounted modules once mounting succeeds.
    pub fn banner(mut self, banner: bool) -> Self {
        self.banner = banner;
        self
    }

    pub fn build(self) -> Kit<R> {
        Kit {
            router: self.router,
            prefix: normalize_prefix(&self.prefix),
            banner: self.banner,
            modules: HashMap::new(),
            order: Vec::new(),
            initialized: HashSet::new(),
            mounted: false,
        }
    }
}

/// Registry of modules that resolves their dependency order, initializes
/// them and mounts their routes onto a shared router.
///
/// Registration and mounting are expected to happen once, sequentially,
/// during startup.
pub struct Kit<R: Router> {
    router: R,
    prefix: String,
    banner: bool,
    modules: HashMap<String, Box<dyn Module>>,
    // Registration order; also the root order of the topological sort
    order: Vec<String>,
    // Modules whose init succeeded; a retried mount does not init them again
    initialized: HashSet<String>,
    mounted: bool,
}

impl<R: Router> Kit<R> {
    pub fn builder(router: R) -> Builder<R> {
        Builder::new(router)
    }

    /// Registers a module. Its dependencies must already be registered.
    pub fn register(&mut self, module: impl Module) -> Result<(), Error> {
        self.register_boxed(Box::new(module))
    }

    pub fn register_boxed(&mut self, module: Box<dyn Module>) -> Result<(), Error> {
        if self.mounted {
            return Err(KitErrorKind::AlreadyMounted.into());
        }

        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            warn!("Module {name} is already registered");
            return Err(KitErrorKind::DuplicateModule(name).into());
        }

        if let Some(dependency) = module
            .dependencies()
            .into_iter()
            .find(|dependency| !self.modules.contains_key(dependency))
        {
            warn!("Module {name} depends on unregistered module {dependency}");
            return Err(KitErrorKind::UnresolvedDependency {
                module: name,
                dependency,
            }
            .into());
        }

        self.modules.insert(name.clone(), module);
        self.order.push(name);
        debug!("Registered modules: {:?}", self.order);

        Ok(())
    }

    /// Initializes every module in dependency order and binds their
    /// middleware and routes onto the router.
    ///
    /// On error the router is left untouched and the kit stays unmounted.
    /// Modules that initialized before the failure are not initialized again
    /// if `mount` is retried.
    pub fn mount(&mut self) -> Result<(), Error> {
        if self.mounted {
            return Err(KitErrorKind::AlreadyMounted.into());
        }

        let graph: HashMap<String, Vec<String>> = self
            .order
            .iter()
            .filter_map(|name| {
                self.modules
                    .get(name)
                    .map(|module| (name.clone(), module.dependencies()))
            })
            .collect();
        let sorted = topological_order(&self.order, &graph)?;
        debug!("Module mount order: {sorted:?}");

        for name in &sorted {
            if !self.initialized.contains(name) {
                self.init_module(name, &graph[name])?;
                self.initialized.insert(name.clone());
            }
        }

        let mut middleware: Vec<Middleware> = Vec::new();
        let mut routes: Vec<(Verb, Route)> = Vec::new();
        for name in &sorted {
            let module = &self.modules[name];
            middleware.extend(module.middleware());
            for route in module.routes() {
                let verb = Verb::try_from(&route.method).map_err(|method| {
                    warn!("Route {} of module {name} uses method {method}", route.path);
                    Error::new(KitErrorKind::UnsupportedMethod(method))
                })?;
                routes.push((verb, route));
            }
        }

        for middleware in middleware {
            self.router.use_middleware(middleware);
        }
        for (verb, route) in routes {
            let path = join_path(&self.prefix, &route.path);
            debug!("Mounting {} {path} ({})", route.method, route.name);
            router::bind(&mut self.router, verb, &path, route.handler, route.middleware);
        }

        self.mounted = true;

        if self.banner {
            let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
            names.sort_unstable();
            info!("Mounted {} modules: {}", names.len(), names.join(", "));
        }

        Ok(())
    }

    fn init_module(&mut self, name: &str, dependencies: &[String]) -> Result<(), Error> {
        // Take the module out so it can be borrowed mutably while its
        // dependencies are borrowed from the map.
        let Some(mut module) = self.modules.remove(name) else {
            return Ok(());
        };

        let resolved = dependencies
            .iter()
            .filter_map(|dependency| {
                self.modules
                    .get_key_value(dependency)
                    .map(|(key, module)| (key.as_str(), module.as_ref()))
            })
            .collect();
        let result = module.init(&Dependencies::new(resolved));
        self.modules.insert(name.to_string(), module);

        result.map_err(|cause| {
            error!("Module {name} failed to initialize: {cause}");
            Error::init_failed(name, cause)
        })?;
        debug!("Initialized module {name}");

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(name).map(|module| module.as_ref())
    }

    pub fn get_as<T: Module>(&self, name: &str) -> Option<&T> {
        self.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Module names in registration order.
    pub fn module_names(&self) -> &[String] {
        &self.order
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn into_router(self) -> R {
        self.router
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Done,
}

/// Orders `roots` so every module comes after its dependencies.
///
/// Roots are visited in the order given and dependencies in declared
/// order, so the result is deterministic.
pub fn topological_order(
    roots: &[String],
    graph: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, Error> {
    fn visit<'a>(
        name: &'a str,
        graph: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        sorted: &mut Vec<String>,
    ) -> Result<(), Error> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(KitErrorKind::CircularDependency(name.to_string()).into())
            }
            None => {}
        }

        marks.insert(name, Mark::InProgress);
        for dependency in graph.get(name).map(Vec::as_slice).unwrap_or_default() {
            if !graph.contains_key(dependency) {
                return Err(KitErrorKind::UnresolvedDependency {
                    module: name.to_string(),
                    dependency: dependency.clone(),
                }
                .into());
            }
            visit(dependency, graph, marks, sorted)?;
        }
        marks.insert(name, Mark::Done);
        sorted.push(name.to_string());

        Ok(())
    }

    let mut marks = HashMap::new();
    let mut sorted = Vec::with_capacity(roots.len());
    for name in roots {
        visit(name, graph, &mut marks, &mut sorted)?;
    }

    Ok(sorted)
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}
