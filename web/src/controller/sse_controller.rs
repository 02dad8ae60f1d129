use crate::controller::ApiResponse;
use crate::error::{Error, Result};
use crate::params::sse::{EventParams, UsersBroadcastParams};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde::Serialize;
use sse::{BroadcastMessage, ClientId, Hub, SseErrorKind, SseService, UserId};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct BroadcastReceipt {
    event_id: String,
}

fn running_hub(service: &SseService) -> Result<Arc<Hub>> {
    service
        .hub()
        .ok_or_else(|| SseErrorKind::ServiceNotRunning.into())
}

fn queue(service: &SseService, message: BroadcastMessage) -> Result<impl IntoResponse> {
    let receipt = BroadcastReceipt {
        event_id: message.event.id.clone(),
    };
    service.broadcast(message)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), receipt)),
    ))
}

/// POST an event to every connected client
pub async fn broadcast(
    State(service): State<Arc<SseService>>,
    Json(params): Json<EventParams>,
) -> Result<impl IntoResponse> {
    let event = params.into_event()?;
    debug!("POST broadcast SSE event {} to all clients", event.event_type);

    queue(&service, BroadcastMessage::to_all(event))
}

/// POST an event to every connection of one user
pub async fn broadcast_to_user(
    State(service): State<Arc<SseService>>,
    Path(user_id): Path<UserId>,
    Json(params): Json<EventParams>,
) -> Result<impl IntoResponse> {
    let event = params.into_event()?;
    debug!("POST broadcast SSE event {} to user {user_id}", event.event_type);

    queue(&service, BroadcastMessage::to_users(vec![user_id], event))
}

/// POST an event to every connection of several users
pub async fn broadcast_to_users(
    State(service): State<Arc<SseService>>,
    Json(params): Json<UsersBroadcastParams>,
) -> Result<impl IntoResponse> {
    // An empty target list would widen the broadcast to everyone
    if params.user_ids.is_empty() {
        return Err(Error::Invalid("user_ids must not be empty".to_string()));
    }
    let event = params.event.into_event()?;
    debug!(
        "POST broadcast SSE event {} to {} user(s)",
        event.event_type,
        params.user_ids.len()
    );

    queue(&service, BroadcastMessage::to_users(params.user_ids, event))
}

/// POST an event to a single client connection
pub async fn broadcast_to_client(
    State(service): State<Arc<SseService>>,
    Path(client_id): Path<ClientId>,
    Json(params): Json<EventParams>,
) -> Result<impl IntoResponse> {
    let event = params.into_event()?;
    if running_hub(&service)?.get_client(&client_id).is_none() {
        return Err(Error::NotFound(format!("SSE client {client_id}")));
    }
    debug!(
        "POST broadcast SSE event {} to client {client_id}",
        event.event_type
    );

    queue(&service, BroadcastMessage::to_clients(vec![client_id], event))
}

/// GET hub statistics
pub async fn stats(State(service): State<Arc<SseService>>) -> Result<impl IntoResponse> {
    let stats = running_hub(&service)?.stats();

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), stats)))
}

/// GET the users with at least one open connection
pub async fn connected_users(State(service): State<Arc<SseService>>) -> Result<impl IntoResponse> {
    let users = running_hub(&service)?.connected_users();

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), users)))
}

/// GET one user's open connections, oldest first
pub async fn user_clients(
    State(service): State<Arc<SseService>>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse> {
    let clients = running_hub(&service)?.user_clients(&user_id);

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), clients)))
}

/// GET a single connection
pub async fn client(
    State(service): State<Arc<SseService>>,
    Path(client_id): Path<ClientId>,
) -> Result<impl IntoResponse> {
    let client = running_hub(&service)?
        .get_client(&client_id)
        .ok_or_else(|| Error::NotFound(format!("SSE client {client_id}")))?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), client)))
}

/// POST start a new hub
pub async fn start(State(service): State<Arc<SseService>>) -> Result<impl IntoResponse> {
    info!("POST start SSE service");
    service.start()?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        service.status(),
    )))
}

/// POST stop the running hub, disconnecting every client
pub async fn stop(State(service): State<Arc<SseService>>) -> Result<impl IntoResponse> {
    info!("POST stop SSE service");
    service.stop().await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::OK.into())))
}

/// GET whether a hub is running, with its statistics when it is
pub async fn status(State(service): State<Arc<SseService>>) -> impl IntoResponse {
    Json(ApiResponse::new(StatusCode::OK.into(), service.status()))
}
