//! The lobby handshake.
//!
//! Rooms are created, joined, watched and searched through a lobby
//! service before any room connection opens. The exchange is plain
//! request/response: a path, the caller's identity, and a body encoded
//! with the client's [`Codec`](roomwire_protocol::Codec). Deployments plug
//! in their own HTTP client by implementing [`Lobby`].

use roomwire_protocol::RoomId;

/// Creates a room.
pub const CREATE_PATH: &str = "/rooms";

/// Searches rooms.
pub const SEARCH_PATH: &str = "/rooms/search";

pub fn join_by_id_path(id: &RoomId) -> String {
    format!("/rooms/join/id/{id}")
}

pub fn join_by_number_path(number: u32) -> String {
    format!("/rooms/join/number/{number}")
}

pub fn random_join_path(search_group: u32) -> String {
    format!("/rooms/join/random/{search_group}")
}

pub fn watch_by_id_path(id: &RoomId) -> String {
    format!("/rooms/watch/id/{id}")
}

pub fn watch_by_number_path(number: u32) -> String {
    format!("/rooms/watch/number/{number}")
}

/// One handshake call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRequest {
    pub path: String,
    pub app_id: String,
    pub user_id: String,
    /// Bearer token authenticating the user to the lobby.
    pub bearer: String,
    /// Codec-encoded request body.
    pub body: Vec<u8>,
}

/// Errors a lobby call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The lobby answered with a non-success status.
    #[error("lobby returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The lobby could not be reached.
    #[error("lobby unavailable: {0}")]
    Unavailable(String),
}

/// Performs handshake calls. Returns the codec-encoded response body.
pub trait Lobby: Send + Sync + 'static {
    fn call(
        &self,
        request: LobbyRequest,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, LobbyError>> + Send;
}
