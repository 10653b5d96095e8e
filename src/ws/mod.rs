//! WebSocket connection management
//!
//! A single task owns the socket and the connection state machine:
//! connect, staged re-subscription, heartbeat, failure detection, and
//! reconnect with jittered exponential backoff.

mod backoff;
mod client;
mod types;

pub use backoff::BackoffPolicy;
pub use client::{CatalogUpdate, ConnectionManager};
pub use types::ConnState;
