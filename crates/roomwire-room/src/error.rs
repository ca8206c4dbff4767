//! Error types for the room layer.

use roomwire_dispatch::DispatchError;
use roomwire_protocol::{MsgType, ProtocolError};
use roomwire_transport::TransportError;

/// Errors that can occur in a room session.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A regular event skipped or repeated a sequence number.
    #[error("invalid event sequence number: got {got}, want {expected}")]
    SequenceMismatch { expected: u32, got: u32 },

    /// The server closed the connection with a retryable code.
    #[error("connection closed with code {code}: {reason}")]
    ClosedAbnormally { code: u16, reason: String },

    /// The server asked for messages that are no longer retained.
    #[error("cannot resume from message {cursor}: oldest retained is {oldest}")]
    ResumeTooOld { cursor: u32, oldest: u32 },

    /// Every retained outgoing message is still unsent.
    #[error("outbox full: {0} messages waiting")]
    OutboxFull(usize),

    /// The RPC handle does not belong to this room's table.
    #[error("rpc {0} is not registered")]
    RpcNotRegistered(u8),

    /// An inbound RPC named an id with no handler.
    #[error("received unknown rpc id {0}")]
    UnknownRpc(u8),

    #[error("rpc id {0} is already registered")]
    DuplicateRpc(u8),

    /// All 256 RPC ids are taken.
    #[error("rpc table is full")]
    RpcTableFull,

    /// The server refused a message.
    #[error("permission denied for {msg_type:?} message {msg_seq}")]
    PermissionDenied { msg_type: MsgType, msg_seq: u32 },

    #[error("room session already started")]
    AlreadyStarted,

    /// The room is closed; nothing more can be sent.
    #[error("room is closed")]
    Closed,
}

impl RoomError {
    /// Whether this error ends the session when it stops a connection.
    /// Non-fatal errors lead to a reconnect attempt.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(err) => !err.is_retryable(),
            Self::ClosedAbnormally { .. } => false,
            Self::Protocol(_)
            | Self::Dispatch(_)
            | Self::SequenceMismatch { .. }
            | Self::ResumeTooOld { .. } => true,
            Self::OutboxFull(_)
            | Self::RpcNotRegistered(_)
            | Self::UnknownRpc(_)
            | Self::DuplicateRpc(_)
            | Self::RpcTableFull
            | Self::PermissionDenied { .. }
            | Self::AlreadyStarted
            | Self::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatible_transport_is_fatal() {
        let err = RoomError::from(TransportError::Incompatible("no upgrade".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_dropped_connection_is_retryable() {
        let err = RoomError::from(TransportError::ConnectionClosed("eof".into()));
        assert!(!err.is_fatal());
        let err = RoomError::ClosedAbnormally {
            code: 1011,
            reason: "restart".into(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_sequence_mismatch_is_fatal_and_readable() {
        let err = RoomError::SequenceMismatch {
            expected: 3,
            got: 4,
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "invalid event sequence number: got 4, want 3");
    }

    #[test]
    fn test_protocol_error_message_is_transparent() {
        let err = RoomError::from(ProtocolError::UnknownClass(9));
        assert_eq!(err.to_string(), "class id 9 is not registered");
    }
}
