//! Error types for the SSE hub.
use std::error::Error as StdError;
use std::fmt;

/// Error returned synchronously by hub admission and lifecycle calls.
///
/// Per-client delivery failures never surface here; they are only counted
/// in `HubStats::events_dropped`.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: SseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseErrorKind {
    // Global connection cap reached
    MaxClientsReached,
    // The hub's registration queue is full
    RegistrationQueueFull,
    // The hub's broadcast queue is full
    BroadcastQueueFull,
    // No running hub to talk to
    ServiceNotRunning,
    // A hub is already running
    ServiceAlreadyRunning,
    // The caller could not be identified
    Unauthorized,
}

impl Error {
    pub fn new(error_kind: SseErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }
}

impl From<SseErrorKind> for Error {
    fn from(error_kind: SseErrorKind) -> Self {
        Self::new(error_kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let message = match self.error_kind {
            SseErrorKind::MaxClientsReached => "maximum number of SSE clients reached",
            SseErrorKind::RegistrationQueueFull => "SSE registration queue is full",
            SseErrorKind::BroadcastQueueFull => "SSE broadcast queue is full",
            SseErrorKind::ServiceNotRunning => "SSE service is not running",
            SseErrorKind::ServiceAlreadyRunning => "SSE service is already running",
            SseErrorKind::Unauthorized => "unauthorized",
        };
        write!(f, "{message}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
