use crate::controller::ApiResponse;
use crate::error::{Error, Result};
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::params::notification::CreateParams;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use events::{DomainEvent, EventPublisher};
use log::*;
use serde_json::json;

/// POST create a notification and push it to the named users' open connections
pub async fn create(
    AuthenticatedUser(user): AuthenticatedUser,
    State(publisher): State<EventPublisher>,
    Json(params): Json<CreateParams>,
) -> Result<impl IntoResponse> {
    if params.user_ids.is_empty() {
        return Err(Error::Invalid("user_ids must not be empty".to_string()));
    }
    if params.title.trim().is_empty() {
        return Err(Error::Invalid("title must not be empty".to_string()));
    }
    debug!(
        "POST create notification from {} for {} user(s)",
        user.id,
        params.user_ids.len()
    );

    let notification = json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "title": params.title,
        "message": params.message,
        "data": params.data,
        "sender_id": user.id,
        "created_at": Utc::now(),
    });

    publisher
        .publish(DomainEvent::NotificationCreated {
            notification: notification.clone(),
            notify_user_ids: params.user_ids,
        })
        .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), notification)),
    ))
}
