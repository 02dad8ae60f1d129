use axum::http::{header, HeaderValue, Method};
use kit::{AxumRouter, Kit};
use log::*;
use middleware::auth::{StaticTokenVerifier, TokenVerifier};
use service::config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use modules::{AuthModule, HealthModule, NotificationsModule, SseModule};

mod controller;
mod error;
mod extractors;
pub mod middleware;
pub mod modules;
mod params;
mod sse;

pub use error::{Error, Result};
pub use extractors::authenticated_user::CurrentUser;

/// Registers the starter's modules and mounts them. The SSE hub starts as
/// part of the mount and runs under a child of `shutdown`.
pub fn mount_modules(
    kit: &mut Kit<AxumRouter>,
    verifier: Arc<dyn TokenVerifier>,
    hub_config: ::sse::HubConfig,
    shutdown: &CancellationToken,
) -> core::result::Result<(), kit::Error> {
    kit.register(AuthModule::new(verifier))?;
    kit.register(HealthModule)?;
    kit.register(SseModule::new(hub_config, shutdown.clone()))?;
    kit.register(NotificationsModule::new())?;
    kit.mount()
}

/// Builds the whole application router from configuration.
pub fn app(
    config: &Config,
    shutdown: &CancellationToken,
) -> core::result::Result<axum::Router, kit::Error> {
    let verifier = StaticTokenVerifier::new(config.auth_tokens());
    if verifier.is_empty() {
        warn!("No API tokens configured; every protected route will answer 401");
    }

    let mut kit = Kit::builder(AxumRouter::new())
        .prefix(config.route_prefix.as_str())
        .banner(config.mount_banner)
        .build();
    mount_modules(
        &mut kit,
        Arc::new(verifier),
        config.sse_hub_config(),
        shutdown,
    )?;

    Ok(kit.into_router().into_inner().layer(cors_layer(config)))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([
            Method::DELETE,
            Method::GET,
            Method::OPTIONS,
            Method::PATCH,
            Method::POST,
            Method::PUT,
        ])
        .allow_credentials(true)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(origins)
}

/// Serves `app` until Ctrl-C. The signal cancels `shutdown`, which stops the
/// SSE hub and ends every open stream so the graceful shutdown can finish.
pub async fn init_server(
    config: &Config,
    app: axum::Router,
    shutdown: CancellationToken,
) -> core::result::Result<(), Box<dyn std::error::Error>> {
    let server_url = config.listen_address();
    let listener = TcpListener::bind(&server_url).await?;

    info!("Server starting... listening for connections on http://{server_url}");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl-C: {e}");
                    }
                    info!("Shutdown signal received");
                }
                _ = signal.cancelled() => {}
            }
            signal.cancel();
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::sse::message::NOTIFICATION;
    use ::sse::{HubConfig, SseService};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: axum::Router,
        service: Arc<SseService>,
        shutdown: CancellationToken,
    }

    fn test_app() -> TestApp {
        let shutdown = CancellationToken::new();
        let verifier = StaticTokenVerifier::new([
            ("alice-token".to_string(), "alice".to_string()),
            ("bob-token".to_string(), "bob".to_string()),
        ]);
        let hub_config = HubConfig {
            heartbeat_interval: Duration::from_secs(3600),
            ..HubConfig::default()
        };

        let mut kit = Kit::builder(AxumRouter::new()).prefix("/api").build();
        mount_modules(&mut kit, Arc::new(verifier), hub_config, &shutdown).unwrap();
        let service = kit
            .get_as::<SseModule>(modules::sse::NAME)
            .and_then(SseModule::service)
            .unwrap();

        TestApp {
            router: kit.into_router().into_inner(),
            service,
            shutdown,
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_for_clients(service: &SseService, count: usize) {
        for _ in 0..400 {
            if service.hub().map(|hub| hub.client_count()) == Some(count) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} SSE client(s)");
    }

    async fn next_frame(body: &mut axum::body::BodyDataStream) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_is_mounted_under_prefix() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(Method::GET, "/api/health", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"healthy");
    }

    #[tokio::test]
    async fn me_returns_current_user_in_envelope() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(Method::GET, "/api/auth/me", Some("alice-token"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"status_code": 200, "data": {"id": "alice"}})
        );
    }

    #[tokio::test]
    async fn stream_requires_a_user() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(Method::GET, "/api/sse/stream", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_require_a_user() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(Method::GET, "/api/sse/stats", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stream_sends_connected_then_broadcast_events() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                "/api/sse/stream?access_token=alice-token",
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers["x-accel-buffering"], "no");

        let mut body = response.into_body().into_data_stream();
        let connected = next_frame(&mut body).await;
        assert!(connected.contains("event: connected"));
        assert!(connected.contains("\"user_id\":\"alice\""));
        wait_for_clients(&app.service, 1).await;

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/sse/broadcast/user/alice",
                Some("bob-token"),
                Some(json!({"type": "invoice_paid", "data": {"invoice": "inv_1"}})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let event_id = json_body(response).await["data"]["event_id"]
            .as_str()
            .unwrap()
            .to_string();

        let frame = next_frame(&mut body).await;
        assert!(frame.contains(&format!("id: {event_id}")));
        assert!(frame.contains("event: invoice_paid"));
        assert!(frame.contains("data: {\"invoice\":\"inv_1\"}"));

        // Dropping the stream unregisters the client
        drop(body);
        wait_for_clients(&app.service, 0).await;
    }

    #[tokio::test]
    async fn notifications_reach_recipients_streams() {
        let app = test_app();
        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                "/api/sse/stream",
                Some("bob-token"),
                None,
            ))
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        next_frame(&mut body).await;
        wait_for_clients(&app.service, 1).await;

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/notifications",
                Some("alice-token"),
                Some(json!({"user_ids": ["bob"], "title": "Hello", "message": "Welcome aboard"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let frame = next_frame(&mut body).await;
        assert!(frame.contains(&format!("event: {NOTIFICATION}")));
        assert!(frame.contains("\"title\":\"Hello\""));
        assert!(frame.contains("\"sender_id\":\"alice\""));
    }

    #[tokio::test]
    async fn users_broadcast_rejects_empty_targets() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                "/api/sse/broadcast/users",
                Some("alice-token"),
                Some(json!({"user_ids": [], "type": "ping"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(
                Method::GET,
                "/api/sse/clients/missing",
                Some("alice-token"),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_stop_lifecycle_maps_errors_to_status_codes() {
        let app = test_app();
        let call = |method: Method, uri: &'static str| {
            app.router
                .clone()
                .oneshot(request(method, uri, Some("alice-token"), None))
        };

        let response = call(Method::POST, "/api/sse/start").await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = call(Method::POST, "/api/sse/stop").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = call(Method::GET, "/api/sse/stats").await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = call(Method::GET, "/api/sse/status").await.unwrap();
        assert_eq!(json_body(response).await["data"]["running"], json!(false));

        let response = call(Method::POST, "/api/sse/start").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.service.is_running());
    }

    #[tokio::test]
    async fn cancelling_shutdown_ends_open_streams() {
        let app = test_app();
        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                "/api/sse/stream",
                Some("alice-token"),
                None,
            ))
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        next_frame(&mut body).await;
        wait_for_clients(&app.service, 1).await;

        app.shutdown.cancel();

        let end = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }
}
