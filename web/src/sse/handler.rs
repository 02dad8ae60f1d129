use crate::error::Error;
use crate::extractors::authenticated_user::AuthenticatedUser;
use async_stream::stream;
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use log::*;
use serde_json::json;
use sse::message::CONNECTED;
use sse::{Client, Hub, SseErrorKind, SseService};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Unregisters the client and cancels its token when the stream is dropped,
/// whichever way the connection ended.
struct ConnectionGuard {
    hub: Arc<Hub>,
    client_id: String,
    token: CancellationToken,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!("SSE connection {} closed, cleaning up", self.client_id);
        self.token.cancel();
        self.hub.unregister_client(&self.client_id);
    }
}

/// SSE handler that establishes a long-lived connection for real-time updates.
///
/// The first event is `connected`, carrying the new client ID. After that the
/// stream forwards whatever the hub delivers until the client is disconnected
/// (eviction, hub shutdown) or the peer goes away.
pub(crate) async fn sse_handler(
    State(service): State<Arc<SseService>>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let hub = service
        .hub()
        .ok_or_else(|| Error::from(SseErrorKind::ServiceNotRunning))?;

    let (client, mut rx) = Client::new(user.id.clone(), hub.config().buffer_size);
    let mut client = client.with_parent(service.root_token());
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        client = client.with_metadata("user_agent", agent);
    }

    let client_id = client.id().to_string();
    let token = client.cancel_token();
    hub.register_client(client)?;
    debug!("Established SSE connection {client_id} for user {}", user.id);

    let connected = sse::Event::new(
        CONNECTED,
        json!({ "client_id": client_id, "user_id": user.id }),
    )
    .with_defaults();
    let guard = ConnectionGuard {
        hub,
        client_id,
        token: token.clone(),
    };

    let stream = stream! {
        let _guard = guard;
        yield Ok::<Event, Infallible>(connected.to_sse_event());

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => None,
                event = rx.recv() => event,
            };
            match next {
                Some(event) => yield Ok(event.to_sse_event()),
                None => break,
            }
        }
    };

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
            (X_ACCEL_BUFFERING.clone(), HeaderValue::from_static("no")),
        ],
        Sse::new(stream),
    ))
}
