use crate::extractors::authenticated_user::CurrentUser;
use async_trait::async_trait;
use axum::{
    extract::{Query, Request},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kit::{middleware_fn, Middleware};
use log::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves an API token to the user it belongs to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<CurrentUser>;
}

/// Verifier backed by a fixed `token -> user_id` table from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<CurrentUser> {
        self.tokens.get(token).map(CurrentUser::new)
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Token from `Authorization: Bearer <token>`, falling back to the
/// `access_token` query parameter (browsers' `EventSource` cannot set headers).
fn request_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.access_token)
        .filter(|token| !token.is_empty())
}

/// Global middleware that attaches a `CurrentUser` to requests carrying a
/// valid token. Requests without one pass through anonymously.
pub fn authenticate(verifier: Arc<dyn TokenVerifier>) -> Middleware {
    middleware_fn(move |mut request: Request, next: Next| {
        let verifier = Arc::clone(&verifier);
        async move {
            if let Some(token) = request_token(&request) {
                match verifier.verify(&token).await {
                    Some(user) => {
                        trace!("Authenticated request for user {}", user.id);
                        request.extensions_mut().insert(user);
                    }
                    None => debug!("Ignoring unknown API token on {}", request.uri().path()),
                }
            }
            next.run(request).await
        }
    })
}

/// Authentication middleware that returns 401 Unauthorized for unauthenticated requests.
pub async fn require_auth(request: Request, next: Next) -> Response {
    match request.extensions().get::<CurrentUser>() {
        Some(_user) => next.run(request).await,
        None => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    }
}

/// `require_auth` as per-route module middleware.
pub fn protected() -> Middleware {
    middleware_fn(require_auth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::authenticated_user::AuthenticatedUser;
    use axum::body::{to_bytes, Body};
    use kit::{handler, AxumRouter, Router as _};
    use tower::ServiceExt;

    async fn whoami(AuthenticatedUser(user): AuthenticatedUser) -> String {
        user.id
    }

    fn app() -> axum::Router {
        let verifier = StaticTokenVerifier::new([("secret".to_string(), "alice".to_string())]);
        let mut router = AxumRouter::new();
        router.use_middleware(authenticate(Arc::new(verifier)));
        router.get("/whoami", handler(whoami, ()), vec![protected()]);
        router.get("/open", handler(|| async { "open" }, ()), Vec::new());
        router.into_inner()
    }

    async fn get(uri: &str, authorization: Option<&str>) -> (StatusCode, String) {
        let mut request = axum::http::Request::builder().uri(uri);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        let response = app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_require_auth_returns_401_without_token() {
        let (status, _) = get("/whoami", None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_auth_returns_401_with_unknown_token() {
        let (status, _) = get("/whoami", Some("Bearer nope")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token_resolves_user() {
        let (status, body) = get("/whoami", Some("Bearer secret")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn test_access_token_query_parameter_resolves_user() {
        let (status, body) = get("/whoami?access_token=secret", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn test_unprotected_route_allows_anonymous_requests() {
        let (status, body) = get("/open", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "open");
    }
}
