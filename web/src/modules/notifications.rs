use crate::controller::notification_controller;
use crate::middleware::auth::protected;
use crate::modules::sse::{self as sse_module, SseModule};
use events::EventPublisher;
use kit::{handler, Dependencies, InitResult, Module, Route};
use sse::SseDomainEventHandler;
use std::any::Any;
use std::sync::Arc;

pub const NAME: &str = "notifications";

/// Creates notifications and publishes them as domain events; the SSE
/// handler pushes them to the recipients' open connections.
#[derive(Default)]
pub struct NotificationsModule {
    publisher: EventPublisher,
}

impl NotificationsModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }
}

impl Module for NotificationsModule {
    fn name(&self) -> &str {
        NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![sse_module::NAME.to_string()]
    }

    fn init(&mut self, deps: &Dependencies<'_>) -> InitResult {
        let service = deps
            .get_as::<SseModule>(sse_module::NAME)
            .and_then(SseModule::service)
            .ok_or("the sse module must be started before notifications")?;

        self.publisher = std::mem::take(&mut self.publisher)
            .with_handler(Arc::new(SseDomainEventHandler::new(service)));
        Ok(())
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::post(
            "/notifications",
            handler(notification_controller::create, self.publisher.clone()),
        )
        .name("notifications.create")
        .description("Notify users over their open SSE connections")
        .with_middleware(protected())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
