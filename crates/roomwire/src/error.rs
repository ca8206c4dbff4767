//! Unified error type for Roomwire.

use roomwire_dispatch::DispatchError;
use roomwire_protocol::ProtocolError;
use roomwire_room::RoomError;
use roomwire_transport::TransportError;

use crate::LobbyError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `roomwire` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, handshake body).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A room-level error (session, RPC, outbox).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The lobby refused or could not serve a handshake.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// No runtime handle was given and none is current.
    #[error("no tokio runtime available")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Transport(_)));
        assert!(client_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_from_room_error() {
        let client_err: ClientError = RoomError::Closed.into();
        assert!(matches!(client_err, ClientError::Room(_)));
        assert_eq!(client_err.to_string(), "room is closed");
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::Status {
            code: 404,
            message: "no such room".into(),
        };
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Lobby(_)));
        assert_eq!(client_err.to_string(), "lobby returned 404: no such room");
    }
}
