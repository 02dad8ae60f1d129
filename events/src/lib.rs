//! In-process domain events.
//!
//! Modules publish a `DomainEvent` once a business operation has completed;
//! handlers registered on the `EventPublisher` react to it (the SSE crate
//! turns notifications into pushed events). This crate depends on no other
//! workspace crate, so payloads travel as `serde_json::Value`.

use async_trait::async_trait;
use log::*;
use serde_json::Value;
use std::sync::Arc;

/// Users are identified by the string the auth layer resolves.
pub type UserId = String;

/// Business-level changes other parts of the system may react to.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A notification was created for a set of users.
    NotificationCreated {
        /// Serialized notification (title, message and optional data)
        notification: Value,
        /// Users whose open connections should receive it
        notify_user_ids: Vec<UserId>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::NotificationCreated { .. } => "notification_created",
        }
    }
}

/// Trait for handling domain events.
/// Implementations perform side effects such as pushing SSE events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Returns a publisher with `handler` appended.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn publish(&self, event: DomainEvent) {
        trace!(
            "Publishing {} to {} handler(s)",
            event.name(),
            self.handlers.len()
        );
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, event.name()));
        }
    }

    #[tokio::test]
    async fn publish_calls_handlers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let publisher = EventPublisher::new()
            .with_handler(Arc::new(Recorder {
                label: "first",
                seen: Arc::clone(&seen),
            }))
            .with_handler(Arc::new(Recorder {
                label: "second",
                seen: Arc::clone(&seen),
            }));

        publisher
            .publish(DomainEvent::NotificationCreated {
                notification: json!({"title": "hi"}),
                notify_user_ids: vec!["u1".to_string()],
            })
            .await;

        assert_eq!(publisher.handler_count(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:notification_created", "second:notification_created"]
        );
    }

    #[test]
    fn with_handler_leaves_clones_untouched() {
        let empty = EventPublisher::default();
        let extended = empty.clone().with_handler(Arc::new(Recorder {
            label: "only",
            seen: Arc::new(Mutex::new(Vec::new())),
        }));

        assert_eq!(empty.handler_count(), 0);
        assert_eq!(extended.handler_count(), 1);
    }
}
