use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

use sse::{Error as SseError, SseErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

/// Errors a handler can return; each maps to one HTTP status.
#[derive(Debug)]
pub enum Error {
    Sse(SseError),
    NotFound(String),
    Invalid(String),
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Sse(e) => Some(e),
            Error::NotFound(_) | Error::Invalid(_) => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Sse(e) => write!(fmt, "{e}"),
            Error::NotFound(what) => write!(fmt, "{what} not found"),
            Error::Invalid(reason) => write!(fmt, "invalid request: {reason}"),
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Sse(e) => match e.error_kind {
                SseErrorKind::MaxClientsReached
                | SseErrorKind::RegistrationQueueFull
                | SseErrorKind::BroadcastQueueFull
                | SseErrorKind::ServiceNotRunning => StatusCode::SERVICE_UNAVAILABLE,
                SseErrorKind::ServiceAlreadyRunning => StatusCode::CONFLICT,
                SseErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            },
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {self}");
        } else {
            debug!("Request rejected: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

impl From<SseError> for Error {
    fn from(err: SseError) -> Self {
        Self::Sse(err)
    }
}

impl From<SseErrorKind> for Error {
    fn from(kind: SseErrorKind) -> Self {
        Self::Sse(SseError::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_admission_failures_are_service_unavailable() {
        for kind in [
            SseErrorKind::MaxClientsReached,
            SseErrorKind::RegistrationQueueFull,
            SseErrorKind::BroadcastQueueFull,
            SseErrorKind::ServiceNotRunning,
        ] {
            assert_eq!(
                Error::from(kind).status_code(),
                StatusCode::SERVICE_UNAVAILABLE
            );
        }
    }

    #[test]
    fn other_errors_map_to_their_status() {
        assert_eq!(
            Error::from(SseErrorKind::ServiceAlreadyRunning).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::from(SseErrorKind::Unauthorized).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::NotFound("client c1".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Invalid("empty type".to_string()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
