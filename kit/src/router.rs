use crate::route::{Handler, Middleware, Verb};
use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::routing::{
    delete_service, get_service, head_service, options_service, patch_service, post_service,
    put_service, MethodRouter,
};
use futures::future::BoxFuture;
use log::*;

/// The surface the kit mounts modules onto: verb-based route registration
/// plus a global middleware chain.
pub trait Router {
    fn get(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);
    fn post(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);
    fn put(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);
    fn delete(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);
    fn patch(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);
    fn head(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);
    fn options(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>);

    /// Appends to the global middleware chain.
    fn use_middleware(&mut self, middleware: Middleware);
}

/// Dispatches a validated verb to the matching router method.
pub(crate) fn bind<R: Router + ?Sized>(
    router: &mut R,
    verb: Verb,
    path: &str,
    handler: Handler,
    middleware: Vec<Middleware>,
) {
    match verb {
        Verb::Get => router.get(path, handler, middleware),
        Verb::Post => router.post(path, handler, middleware),
        Verb::Put => router.put(path, handler, middleware),
        Verb::Delete => router.delete(path, handler, middleware),
        Verb::Patch => router.patch(path, handler, middleware),
        Verb::Head => router.head(path, handler, middleware),
        Verb::Options => router.options(path, handler, middleware),
    }
}

/// `Router` backed by `axum::Router`.
///
/// Global middleware is collected and only layered on in `into_inner`, so
/// it wraps every route regardless of when the route was added. Middleware
/// registered first runs outermost.
#[derive(Default)]
pub struct AxumRouter {
    inner: axum::Router,
    middleware: Vec<Middleware>,
}

impl AxumRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&mut self, path: &str, method_router: MethodRouter, middleware: Vec<Middleware>) {
        let method_router = middleware
            .into_iter()
            .rev()
            .fold(method_router, |method_router, middleware| {
                method_router.route_layer(from_fn(adapt(middleware)))
            });

        trace!("Binding route {path}");
        let inner = std::mem::take(&mut self.inner);
        self.inner = inner.route(path, method_router);
    }

    /// Finishes the router, applying the global middleware chain.
    pub fn into_inner(self) -> axum::Router {
        self.middleware
            .into_iter()
            .rev()
            .fold(self.inner, |router, middleware| {
                router.layer(from_fn(adapt(middleware)))
            })
    }
}

fn adapt(
    middleware: Middleware,
) -> impl Fn(Request, Next) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |request: Request, next: Next| middleware(request, next)
}

impl Router for AxumRouter {
    fn get(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, get_service(handler), middleware);
    }

    fn post(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, post_service(handler), middleware);
    }

    fn put(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, put_service(handler), middleware);
    }

    fn delete(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, delete_service(handler), middleware);
    }

    fn patch(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, patch_service(handler), middleware);
    }

    fn head(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, head_service(handler), middleware);
    }

    fn options(&mut self, path: &str, handler: Handler, middleware: Vec<Middleware>) {
        self.bind(path, options_service(handler), middleware);
    }

    fn use_middleware(&mut self, middleware: Middleware) {
        self.middleware.push(middleware);
    }
}
