use crate::message::Event;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio_util::sync::CancellationToken;

// The web layer resolves user IDs from the auth context as plain strings
pub type UserId = String;
pub type ClientId = String;

/// One long-lived streaming connection.
///
/// The hub owns the `Client` (and with it the sending half of the outbound
/// channel) from registration until unregistration. The connection handler
/// owns the matching `Receiver` and stops when the token is cancelled or
/// the channel closes.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    user_id: UserId,
    sender: Sender<Event>,
    cancel: CancellationToken,
    metadata: HashMap<String, String>,
    connected_at: DateTime<Utc>,
}

impl Client {
    /// Creates a client with an outbound buffer of `buffer_size` events and
    /// returns it together with the receiving half of that buffer.
    pub fn new(user_id: impl Into<UserId>, buffer_size: usize) -> (Self, Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let client = Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            sender,
            cancel: CancellationToken::new(),
            metadata: HashMap::new(),
            connected_at: Utc::now(),
        };
        (client, receiver)
    }

    /// Ties the client's lifetime to `parent`: cancelling the parent
    /// disconnects the client.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// A handle on the client's lifetime for the connection handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Force-disconnects the client.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Non-blocking send; the event is handed back when the buffer is full
    /// or the receiver is gone.
    pub(crate) fn try_send(&self, event: Event) -> Result<(), TrySendError<Event>> {
        self.sender.try_send(event)
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            connected_at: self.connected_at,
            metadata: self.metadata.clone(),
        }
    }
}

/// Serializable view of a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn clients_get_unique_ids() {
        let (a, _rx_a) = Client::new("u1", 4);
        let (b, _rx_b) = Client::new("u1", 4);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.user_id(), "u1");
    }

    #[test]
    fn try_send_reports_full_buffer() {
        let (client, _rx) = Client::new("u1", 1);

        assert!(client.try_send(Event::new("a", Value::Null)).is_ok());
        assert!(matches!(
            client.try_send(Event::new("b", Value::Null)),
            Err(TrySendError::Full(_))
        ));
    }

    #[test]
    fn parent_cancellation_disconnects_client() {
        let parent = CancellationToken::new();
        let (client, _rx) = Client::new("u1", 1);
        let client = client.with_parent(&parent).with_metadata("agent", "test");

        parent.cancel();

        assert!(client.is_disconnected());
        assert_eq!(client.info().metadata.get("agent").map(String::as_str), Some("test"));
    }
}
