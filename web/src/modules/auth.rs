use crate::controller::auth_controller;
use crate::middleware::auth::{authenticate, protected, TokenVerifier};
use kit::{handler, Dependencies, InitResult, Middleware, Module, Route};
use std::any::Any;
use std::sync::Arc;

pub const NAME: &str = "auth";

/// Resolves callers from API tokens for every route, and exposes the
/// resolved user at `GET /auth/me`.
pub struct AuthModule {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthModule {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> Arc<dyn TokenVerifier> {
        Arc::clone(&self.verifier)
    }
}

impl Module for AuthModule {
    fn name(&self) -> &str {
        NAME
    }

    fn middleware(&self) -> Vec<Middleware> {
        vec![authenticate(self.verifier())]
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::get("/auth/me", handler(auth_controller::me, ()))
            .name("auth.me")
            .description("Current user")
            .with_middleware(protected())]
    }

    fn init(&mut self, _deps: &Dependencies<'_>) -> InitResult {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
