//! Per-subscription connection state.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of one collection listener.
///
/// `Disconnected → Connecting → Subscribed`, back to `Disconnected` on any
/// stream error. There is no terminal state; the supervisor keeps cycling
/// until it is stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    /// No subscription; initial state and the state after an error.
    #[default]
    Disconnected,
    /// Establishing the subscription.
    Connecting,
    /// Receiving change events.
    Subscribed,
}

impl ListenerState {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
