use serde::Deserialize;
use serde_json::Value;
use sse::UserId;

/// Parameters for creating a notification
#[derive(Debug, Deserialize)]
pub(crate) struct CreateParams {
    pub(crate) user_ids: Vec<UserId>,
    pub(crate) title: String,
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) data: Option<Value>,
}
