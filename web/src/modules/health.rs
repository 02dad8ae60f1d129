use crate::controller::health_check_controller;
use kit::{handler, Dependencies, InitResult, Module, Route};
use std::any::Any;

pub const NAME: &str = "health";

#[derive(Debug, Default)]
pub struct HealthModule;

impl Module for HealthModule {
    fn name(&self) -> &str {
        NAME
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("/health", handler(health_check_controller::health_check, ()))
                .name("health.check")
                .description("Liveness probe"),
        ]
    }

    fn init(&mut self, _deps: &Dependencies<'_>) -> InitResult {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
