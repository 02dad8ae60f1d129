use crate::connection::{ClientId, UserId};
use axum::response::sse;
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Event type sent to a client as soon as its stream opens.
pub const CONNECTED: &str = "connected";
/// Event type of the hub's periodic keep-alive.
pub const HEARTBEAT: &str = "heartbeat";
/// Event type used for user notifications.
pub const NOTIFICATION: &str = "notification";

/// A single server-sent event. Transient: it only lives for one broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    /// Client reconnection hint in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: String::new(),
            event_type: event_type.into(),
            data,
            retry: None,
            created: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// Fills in a generated ID and the creation time when they are unset.
    pub fn with_defaults(mut self) -> Self {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        if self.created.is_none() {
            self.created = Some(Utc::now());
        }
        self
    }

    /// Converts to axum's SSE event, which writes the `id:`, `event:`,
    /// `retry:` and `data:` lines in that order.
    pub fn to_sse_event(&self) -> sse::Event {
        let mut event = sse::Event::default();

        let id = single_line(&self.id);
        if !id.is_empty() {
            event = event.id(id);
        }
        let event_type = single_line(&self.event_type);
        if !event_type.is_empty() {
            event = event.event(event_type);
        }
        if let Some(retry) = self.retry {
            event = event.retry(Duration::from_millis(retry));
        }

        let data = serde_json::to_string(&self.data).unwrap_or_else(|e| {
            error!("Failed to serialize SSE event data: {e}");
            "null".to_string()
        });
        event.data(data)
    }
}

// Line breaks would end the field early on the wire.
fn single_line(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect()
}

/// Who a `BroadcastMessage` is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope<'a> {
    /// Only these client connections
    Clients(&'a [ClientId]),
    /// Every connection of these users
    Users(&'a [UserId]),
    /// All connected clients
    Broadcast,
}

/// One event plus its targeting.
///
/// When more than one target list is set, client IDs win over user IDs,
/// which win over "everyone".
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub client_ids: Vec<ClientId>,
    pub user_ids: Vec<UserId>,
    pub event: Event,
}

impl BroadcastMessage {
    pub fn to_all(event: Event) -> Self {
        Self {
            client_ids: Vec::new(),
            user_ids: Vec::new(),
            event,
        }
    }

    pub fn to_users(user_ids: Vec<UserId>, event: Event) -> Self {
        Self {
            client_ids: Vec::new(),
            user_ids,
            event,
        }
    }

    pub fn to_clients(client_ids: Vec<ClientId>, event: Event) -> Self {
        Self {
            client_ids,
            user_ids: Vec::new(),
            event,
        }
    }

    pub fn scope(&self) -> MessageScope<'_> {
        if !self.client_ids.is_empty() {
            MessageScope::Clients(&self.client_ids)
        } else if !self.user_ids.is_empty() {
            MessageScope::Users(&self.user_ids)
        } else {
            MessageScope::Broadcast
        }
    }
}
