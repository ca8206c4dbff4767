//! Room configuration and connection state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for one room session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Inbound frames that may be in flight at once (received but whose
    /// callbacks have not run yet). The receive loop waits when all are
    /// taken.
    pub event_pool_size: usize,

    /// Starting size of each inbound frame buffer. Buffers double as
    /// needed and keep their size when returned.
    pub event_buffer_size: usize,

    /// Consecutive failed attempts tolerated before the room closes.
    pub max_reconnection: u32,

    /// Fixed delay between connection attempts, measured from the start
    /// of the failed attempt.
    pub retry_interval: Duration,

    /// Outgoing messages retained for resending after a reconnect.
    pub outbox_capacity: usize,

    /// What an inbound sequence gap does.
    pub gap_policy: GapPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            event_pool_size: 16,
            event_buffer_size: 256,
            max_reconnection: 30,
            retry_interval: Duration::from_secs(1),
            outbox_capacity: 64,
            gap_policy: GapPolicy::Fatal,
        }
    }
}

/// Reaction to a regular event whose sequence number is not the next one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapPolicy {
    /// Close the room.
    #[default]
    Fatal,
    /// Drop the connection and resume from the last contiguous event.
    Reconnect,
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// Connection state of a room session.
///
/// ```text
/// Connecting → Receiving → Running
///     ↑            │          │
///     └── Reconnecting ◀──────┘
///                  │
///                  ▼
///               Closed   (reachable from every state)
/// ```
///
/// - **Connecting**: opening the transport.
/// - **Receiving**: connected, events flow in; outgoing messages wait for
///   the server's ready signal.
/// - **Running**: both directions flow.
/// - **Reconnecting**: the last attempt failed; waiting to retry.
/// - **Closed**: terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Connecting,
    Receiving,
    Running,
    Reconnecting,
    Closed,
}

impl RoomState {
    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomState::*;
        match (self, target) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Connecting, Receiving | Reconnecting) => true,
            (Receiving, Running | Reconnecting) => true,
            (Running, Reconnecting) => true,
            (Reconnecting, Connecting) => true,
            _ => false,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Receiving | Self::Running)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Receiving => write!(f, "Receiving"),
            Self::Running => write!(f, "Running"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_state_happy_path_transitions() {
        assert!(RoomState::Connecting.can_transition_to(RoomState::Receiving));
        assert!(RoomState::Receiving.can_transition_to(RoomState::Running));
        assert!(RoomState::Running.can_transition_to(RoomState::Reconnecting));
        assert!(RoomState::Reconnecting.can_transition_to(RoomState::Connecting));
    }

    #[test]
    fn test_room_state_cannot_skip_ready() {
        assert!(!RoomState::Connecting.can_transition_to(RoomState::Running));
        assert!(!RoomState::Reconnecting.can_transition_to(RoomState::Running));
    }

    #[test]
    fn test_room_state_closed_is_terminal() {
        assert!(RoomState::Running.can_transition_to(RoomState::Closed));
        assert!(!RoomState::Closed.can_transition_to(RoomState::Connecting));
        assert!(!RoomState::Closed.can_transition_to(RoomState::Closed));
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::Reconnecting.to_string(), "Reconnecting");
        assert!(RoomState::Running.is_connected());
        assert!(!RoomState::Connecting.is_connected());
    }

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.event_pool_size, 16);
        assert_eq!(config.event_buffer_size, 256);
        assert_eq!(config.max_reconnection, 30);
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert_eq!(config.outbox_capacity, 64);
        assert_eq!(config.gap_policy, GapPolicy::Fatal);
    }

    #[test]
    fn test_room_config_partial_json_fills_defaults() {
        let config: RoomConfig =
            serde_json::from_str(r#"{"max_reconnection": 3, "gap_policy": "Reconnect"}"#)
                .unwrap();
        assert_eq!(config.max_reconnection, 3);
        assert_eq!(config.gap_policy, GapPolicy::Reconnect);
        assert_eq!(config.event_pool_size, 16);
    }
}
