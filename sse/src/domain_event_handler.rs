use crate::message::{BroadcastMessage, Event, NOTIFICATION};
use crate::service::SseService;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Turns domain events into SSE events for the users they name.
///
/// The publisher decides who is notified; this handler only routes. A
/// stopped service or a full broadcast queue is logged and the event is
/// dropped.
pub struct SseDomainEventHandler {
    service: Arc<SseService>,
}

impl SseDomainEventHandler {
    pub fn new(service: Arc<SseService>) -> Self {
        Self { service }
    }

    fn send_to_users(&self, event: Event, user_ids: &[events::UserId]) {
        if user_ids.is_empty() {
            debug!("No users to notify for SSE event {}", event.event_type);
            return;
        }

        let event_type = event.event_type.clone();
        match self
            .service
            .broadcast(BroadcastMessage::to_users(user_ids.to_vec(), event))
        {
            Ok(()) => debug!(
                "Queued SSE event {event_type} for {} user(s): {:?}",
                user_ids.len(),
                user_ids
            ),
            Err(e) => warn!("Dropping SSE event {event_type}: {e}"),
        }
    }
}

#[async_trait]
impl EventHandler for SseDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::NotificationCreated {
                notification,
                notify_user_ids,
            } => {
                debug!("Handling NotificationCreated event");
                self.send_to_users(
                    Event::new(NOTIFICATION, notification.clone()),
                    notify_user_ids,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Client;
    use crate::hub::HubConfig;
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn notification_reaches_named_users_only() {
        let service = Arc::new(SseService::new(
            HubConfig {
                heartbeat_interval: Duration::from_secs(3600),
                ..HubConfig::default()
            },
            CancellationToken::new(),
        ));
        let hub = service.start().unwrap();
        let (alice, mut alice_rx) = Client::new("alice", 4);
        let (bob, mut bob_rx) = Client::new("bob", 4);
        hub.register_client(alice).unwrap();
        hub.register_client(bob).unwrap();
        while hub.client_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let handler = SseDomainEventHandler::new(Arc::clone(&service));
        handler
            .handle(&DomainEvent::NotificationCreated {
                notification: json!({"title": "Invoice paid"}),
                notify_user_ids: vec!["alice".to_string()],
            })
            .await;

        let event = tokio::time::timeout(Duration::from_secs(2), alice_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, NOTIFICATION);
        assert_eq!(event.data, json!({"title": "Invoice paid"}));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_service_drops_the_event() {
        let service = Arc::new(SseService::new(
            HubConfig::default(),
            CancellationToken::new(),
        ));
        let handler = SseDomainEventHandler::new(service);

        // Must not panic or block
        handler
            .handle(&DomainEvent::NotificationCreated {
                notification: json!({}),
                notify_user_ids: vec!["alice".to_string()],
            })
            .await;
    }
}
