//! Server-Sent Events (SSE) hub for pushing real-time updates to users.
//!
//! # Architecture
//!
//! - **Single writer**: one event loop task (`Hub::run`) owns the client map
//!   and the per-user index. Registration, removal and broadcasts reach it
//!   through bounded queues; callers never wait on a full queue, they get an
//!   error instead.
//! - **Non-blocking delivery**: every client has a bounded outbound buffer.
//!   A slow client loses events (counted in `HubStats::events_dropped`)
//!   rather than stalling the loop.
//! - **Admission control**: optional global and per-user caps. At the
//!   per-user cap the user's oldest connection is evicted.
//! - **Ephemeral events**: nothing is persisted or replayed.
//!
//! # Modules
//!
//! - `connection`: `Client`, one streaming connection and its outbound buffer
//! - `hub`: the event loop, configuration and statistics
//! - `message`: `Event` and `BroadcastMessage` targeting
//! - `service`: `SseService`, start/stop control over the current hub
//! - `domain_event_handler`: bridge from `events::DomainEvent`

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod hub;
pub mod message;
pub mod service;

pub use connection::{Client, ClientId, ClientInfo, UserId};
pub use domain_event_handler::SseDomainEventHandler;
pub use error::{Error, SseErrorKind};
pub use hub::{Hub, HubConfig, HubStats, HubStatus};
pub use message::{BroadcastMessage, Event, MessageScope};
pub use service::{ServiceStatus, SseService};
