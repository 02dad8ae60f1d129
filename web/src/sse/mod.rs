//! SSE HTTP handler for the web layer.
//!
//! The hub, clients and event types live in the `sse` crate; this module
//! only turns a registered client into a streaming response.

pub mod handler;
