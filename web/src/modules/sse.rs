use crate::controller::sse_controller;
use crate::middleware::auth::protected;
use crate::modules::auth::{self, AuthModule};
use crate::sse::handler::sse_handler;
use kit::{handler, Dependencies, InitResult, Module, Route};
use log::*;
use sse::{HubConfig, SseService};
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "sse";

/// Starts the SSE hub when mounted and serves the stream plus its
/// broadcast and admin endpoints.
pub struct SseModule {
    config: HubConfig,
    root: CancellationToken,
    service: Option<Arc<SseService>>,
}

impl SseModule {
    /// `root` parents every hub this module runs; cancel it to close all streams.
    pub fn new(config: HubConfig, root: CancellationToken) -> Self {
        Self {
            config,
            root,
            service: None,
        }
    }

    /// The service started by `init`.
    pub fn service(&self) -> Option<Arc<SseService>> {
        self.service.clone()
    }
}

impl Module for SseModule {
    fn name(&self) -> &str {
        NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![auth::NAME.to_string()]
    }

    fn init(&mut self, deps: &Dependencies<'_>) -> InitResult {
        // Streams resolve their user from the auth middleware
        deps.get_as::<AuthModule>(auth::NAME)
            .ok_or("the auth module must be mounted before sse")?;

        let service = Arc::new(SseService::new(self.config.clone(), self.root.clone()));
        service.start()?;
        info!(
            "SSE module ready (buffer={}, heartbeat={:?})",
            self.config.buffer_size, self.config.heartbeat_interval
        );
        self.service = Some(service);
        Ok(())
    }

    fn routes(&self) -> Vec<Route> {
        let Some(service) = self.service.as_ref() else {
            return Vec::new();
        };
        let state = || Arc::clone(service);

        let admin = vec![
            Route::post("/sse/broadcast", handler(sse_controller::broadcast, state()))
                .name("sse.broadcast")
                .description("Broadcast an event to every client"),
            Route::post(
                "/sse/broadcast/user/:user_id",
                handler(sse_controller::broadcast_to_user, state()),
            )
            .name("sse.broadcast.user")
            .description("Send an event to one user's clients"),
            Route::post(
                "/sse/broadcast/users",
                handler(sse_controller::broadcast_to_users, state()),
            )
            .name("sse.broadcast.users")
            .description("Send an event to several users' clients"),
            Route::post(
                "/sse/broadcast/client/:client_id",
                handler(sse_controller::broadcast_to_client, state()),
            )
            .name("sse.broadcast.client")
            .description("Send an event to one client"),
            Route::get("/sse/stats", handler(sse_controller::stats, state()))
                .name("sse.stats")
                .description("Hub statistics"),
            Route::get("/sse/users", handler(sse_controller::connected_users, state()))
                .name("sse.users")
                .description("Users with open connections"),
            Route::get(
                "/sse/users/:user_id/clients",
                handler(sse_controller::user_clients, state()),
            )
            .name("sse.users.clients")
            .description("A user's open connections"),
            Route::get(
                "/sse/clients/:client_id",
                handler(sse_controller::client, state()),
            )
            .name("sse.client")
            .description("One open connection"),
            Route::post("/sse/start", handler(sse_controller::start, state()))
                .name("sse.start")
                .description("Start the hub"),
            Route::post("/sse/stop", handler(sse_controller::stop, state()))
                .name("sse.stop")
                .description("Stop the hub and disconnect everyone"),
            Route::get("/sse/status", handler(sse_controller::status, state()))
                .name("sse.status")
                .description("Hub status"),
        ];

        // The stream handler checks the user itself so it can answer 401
        // before any event is written.
        std::iter::once(
            Route::get("/sse/stream", handler(sse_handler, state()))
                .name("sse.stream")
                .description("Open an event stream"),
        )
        .chain(
            admin
                .into_iter()
                .map(|route| route.with_middleware(protected())),
        )
        .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
