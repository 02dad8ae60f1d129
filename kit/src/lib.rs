//! Module registration and mounting for the starter.
//!
//! A `Kit` collects named `Module`s, orders them so each is initialized
//! after the modules it depends on, and mounts their middleware and routes
//! onto a `Router`.
//!
//! # Lifecycle
//!
//! 1. `Kit::builder(router)` configures the route prefix and startup banner.
//! 2. `Kit::register` validates the module name and its dependencies. A
//!    dependency must be registered before the module that needs it.
//! 3. `Kit::mount` sorts the modules (depth-first, roots in registration
//!    order), calls each module's `init` with its resolved dependencies,
//!    then installs middleware and binds routes. Any failure aborts the
//!    whole mount before the router is modified.
//!
//! # Example
//!
//! ```rust,ignore
//! use kit::{AxumRouter, Kit};
//!
//! let mut kit = Kit::builder(AxumRouter::new()).prefix("/api").banner(true).build();
//! kit.register(AuthModule::new(verifier))?;
//! kit.register(SseModule::new(hub_config, shutdown.clone()))?;
//! kit.mount()?;
//! let app: axum::Router = kit.into_router().into_inner();
//! ```

pub mod error;
pub mod kit;
pub mod module;
pub mod route;
pub mod router;

pub use error::{Error, KitErrorKind};
pub use kit::{Builder, Kit};
pub use module::{Dependencies, InitResult, Module};
pub use route::{handler, middleware_fn, Handler, Middleware, Route};
pub use router::{AxumRouter, Router};
