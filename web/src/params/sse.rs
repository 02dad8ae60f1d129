use crate::error::Error;
use serde::Deserialize;
use serde_json::Value;
use sse::{Event, UserId};

/// Body of the broadcast endpoints: the event to deliver.
///
/// # Fields
///
/// * `type` - Event type, written as the SSE `event:` line
/// * `data` - Any JSON payload, written as the `data:` line
/// * `id` - Optional event ID; generated when absent
/// * `retry` - Optional reconnection hint in milliseconds
#[derive(Debug, Deserialize)]
pub(crate) struct EventParams {
    #[serde(rename = "type")]
    pub(crate) event_type: String,
    #[serde(default)]
    pub(crate) data: Value,
    pub(crate) id: Option<String>,
    pub(crate) retry: Option<u64>,
}

impl EventParams {
    /// Validates the params and builds an event with its ID and timestamp
    /// already assigned, so the caller can report the ID back.
    pub(crate) fn into_event(self) -> Result<Event, Error> {
        if self.event_type.trim().is_empty() {
            return Err(Error::Invalid("event type must not be empty".to_string()));
        }

        let mut event = Event::new(self.event_type, self.data);
        if let Some(id) = self.id.filter(|id| !id.is_empty()) {
            event = event.with_id(id);
        }
        if let Some(retry) = self.retry {
            event = event.with_retry(retry);
        }
        Ok(event.with_defaults())
    }
}

/// Body of `POST /sse/broadcast/users`: the target users plus the event fields.
#[derive(Debug, Deserialize)]
pub(crate) struct UsersBroadcastParams {
    pub(crate) user_ids: Vec<UserId>,
    #[serde(flatten)]
    pub(crate) event: EventParams,
}
