use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tower::util::BoxCloneService;

/// A route handler with its state already bound.
pub type Handler = BoxCloneService<Request, Response, Infallible>;

/// Middleware in the `from_fn` shape: receives the request and the rest of
/// the chain.
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// Binds an axum handler to its state and erases its type.
pub fn handler<H, T, S>(handler: H, state: S) -> Handler
where
    H: axum::handler::Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    BoxCloneService::new(handler.with_state(state))
}

/// Wraps an async function into a `Middleware`.
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |request: Request, next: Next| -> BoxFuture<'static, Response> {
            Box::pin(f(request, next))
        },
    )
}

/// A single endpoint contributed by a module.
///
/// Routes are built with the verb constructors and then decorated:
///
/// ```rust,ignore
/// Route::get("/health", handler(health_check, ()))
///     .name("health.check")
///     .description("Liveness probe");
/// ```
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub handler: Handler,
    pub middleware: Vec<Middleware>,
    pub name: String,
    pub description: String,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: Handler) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
            middleware: Vec::new(),
            name: String::new(),
            description: String::new(),
        }
    }

    pub fn get(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    pub fn patch(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::PATCH, path, handler)
    }

    /// Dotted `module.action` name, used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a per-route middleware. Middleware added first runs first.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// The seven verbs a `Router` can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl TryFrom<&Method> for Verb {
    type Error = String;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match *method {
            Method::GET => Ok(Verb::Get),
            Method::POST => Ok(Verb::Post),
            Method::PUT => Ok(Verb::Put),
            Method::DELETE => Ok(Verb::Delete),
            Method::PATCH => Ok(Verb::Patch),
            Method::HEAD => Ok(Verb::Head),
            Method::OPTIONS => Ok(Verb::Options),
            _ => Err(method.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_accepts_the_seven_recognized_methods() {
        for (method, verb) in [
            (Method::GET, Verb::Get),
            (Method::POST, Verb::Post),
            (Method::PUT, Verb::Put),
            (Method::DELETE, Verb::Delete),
            (Method::PATCH, Verb::Patch),
            (Method::HEAD, Verb::Head),
            (Method::OPTIONS, Verb::Options),
        ] {
            assert_eq!(Verb::try_from(&method), Ok(verb));
        }
    }

    #[test]
    fn verb_rejects_other_methods() {
        assert_eq!(Verb::try_from(&Method::TRACE), Err("TRACE".to_string()));
        assert_eq!(Verb::try_from(&Method::CONNECT), Err("CONNECT".to_string()));
    }

    #[test]
    fn route_builder_records_metadata() {
        async fn ok() -> &'static str {
            "ok"
        }

        let route = Route::post("/things", handler(ok, ()))
            .name("things.create")
            .description("Creates a thing")
            .with_middleware(middleware_fn(|request, next: Next| next.run(request)));

        assert_eq!(route.method, Method::POST);
        assert_eq!(route.path, "/things");
        assert_eq!(route.name, "things.create");
        assert_eq!(route.description, "Creates a thing");
        assert_eq!(route.middleware.len(), 1);
    }
}
