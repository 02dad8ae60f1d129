use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;

/// GET the user the request's token resolves to
pub async fn me(AuthenticatedUser(user): AuthenticatedUser) -> impl IntoResponse {
    debug!("GET current user {}", user.id);

    Json(ApiResponse::new(StatusCode::OK.into(), user))
}
