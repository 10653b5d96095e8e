//! Connection state machine states

use serde::Serialize;

/// Connection lifecycle state.
///
/// Exactly one instance exists per process, owned by the
/// connection-manager task; everyone else observes it through the metrics
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnState {
    /// Not connected and not trying yet
    Disconnected = 0,
    /// Transport handshake in progress
    Connecting = 1,
    /// Connected; staged chunk subscription running
    Subscribing = 2,
    /// All chunks submitted; receiving data
    Live = 3,
    /// Failure detected; waiting out the backoff delay
    Backoff = 4,
}

impl ConnState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnState::Connecting,
            2 => ConnState::Subscribing,
            3 => ConnState::Live,
            4 => ConnState::Backoff,
            _ => ConnState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Subscribing => "subscribing",
            ConnState::Live => "live",
            ConnState::Backoff => "backoff",
        };
        write!(f, "{}", name)
    }
}
