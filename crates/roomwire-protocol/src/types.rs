//! Identity and handshake types.
//!
//! These travel as JSON bodies between the client and the lobby (the
//! out-of-band service that creates, joins, and searches rooms). Property
//! maps inside them are kept as wire-encoded [`Dict`] bytes, so every peer
//! sees exactly the bytes the room server sees; the `decode_*` helpers
//! turn them into values with a [`TypeRegistry`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Dict, ProtocolError, Query, Reader, TypeRegistry, Value, Writer};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's id, assigned by the application (the "user id").
///
/// A newtype so a `RoomId` can never be passed where a player is expected.
/// `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A room's id, assigned by the lobby.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The pre-built credential the room server checks at connect time.
/// Computing it is the lobby's job; the client only forwards it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub nonce: String,
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Room descriptors
// ---------------------------------------------------------------------------

/// A room as the lobby describes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub app_id: String,
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    /// Short join number, when the room was created with one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    pub search_group: u32,
    pub max_players: u32,
    pub players: u32,
    pub watchers: u32,
    /// Wire-encoded [`Dict`].
    #[serde(default)]
    pub public_props: Vec<u8>,
    /// Wire-encoded [`Dict`]. Only present for members of the room.
    #[serde(default)]
    pub private_props: Vec<u8>,
}

impl RoomInfo {
    pub fn decode_public_props(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Dict, ProtocolError> {
        decode_props(&self.public_props, registry)
    }

    pub fn decode_private_props(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Dict, ProtocolError> {
        decode_props(&self.private_props, registry)
    }
}

/// A player as listed in a join response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: PlayerId,
    /// Wire-encoded [`Dict`].
    #[serde(default)]
    pub props: Vec<u8>,
}

impl ClientInfo {
    /// Encodes `props` for the handshake.
    pub fn new(
        id: impl Into<PlayerId>,
        props: &Dict,
        registry: &TypeRegistry,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: id.into(),
            props: encode_props(props, registry)?,
        })
    }

    pub fn decode_props(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Dict, ProtocolError> {
        decode_props(&self.props, registry)
    }
}

/// Everything needed to open a room session, returned by a successful
/// create, join, or watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRoom {
    pub room_info: RoomInfo,
    /// The room server's endpoint, e.g. `wss://game.example/rooms/r1`.
    pub url: String,
    pub auth: AuthToken,
    /// How long the server keeps the seat for a disconnected client.
    pub deadline_secs: u32,
    pub players: Vec<ClientInfo>,
    pub master_id: PlayerId,
}

// ---------------------------------------------------------------------------
// Handshake requests
// ---------------------------------------------------------------------------

/// Settings for a new room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomOption {
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    /// Ask the lobby to assign a short join number.
    pub with_number: bool,
    pub search_group: u32,
    /// Zero means no limit.
    pub max_players: u32,
    pub client_deadline_secs: u32,
    /// Wire-encoded [`Dict`].
    #[serde(default)]
    pub public_props: Vec<u8>,
    /// Wire-encoded [`Dict`].
    #[serde(default)]
    pub private_props: Vec<u8>,
}

impl Default for RoomOption {
    fn default() -> Self {
        Self {
            visible: true,
            joinable: true,
            watchable: true,
            with_number: false,
            search_group: 0,
            max_players: 0,
            client_deadline_secs: 0,
            public_props: Vec::new(),
            private_props: Vec::new(),
        }
    }
}

impl RoomOption {
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn joinable(mut self, joinable: bool) -> Self {
        self.joinable = joinable;
        self
    }

    pub fn watchable(mut self, watchable: bool) -> Self {
        self.watchable = watchable;
        self
    }

    pub fn with_number(mut self, with_number: bool) -> Self {
        self.with_number = with_number;
        self
    }

    pub fn search_group(mut self, group: u32) -> Self {
        self.search_group = group;
        self
    }

    pub fn max_players(mut self, max: u32) -> Self {
        self.max_players = max;
        self
    }

    pub fn client_deadline_secs(mut self, secs: u32) -> Self {
        self.client_deadline_secs = secs;
        self
    }

    pub fn public_props(
        mut self,
        props: &Dict,
        registry: &TypeRegistry,
    ) -> Result<Self, ProtocolError> {
        self.public_props = encode_props(props, registry)?;
        Ok(self)
    }

    pub fn private_props(
        mut self,
        props: &Dict,
        registry: &TypeRegistry,
    ) -> Result<Self, ProtocolError> {
        self.private_props = encode_props(props, registry)?;
        Ok(self)
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateParams {
    pub room_option: RoomOption,
    pub client_info: ClientInfo,
}

/// Body of a join or watch request. `queries` must all hold for the
/// target room; they are empty for plain id/number joins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<crate::Condition>,
    pub client_info: ClientInfo,
}

/// Body of a search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub search_group: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<crate::Condition>,
    pub limit: u32,
    pub check_joinable: bool,
    pub check_watchable: bool,
}

impl SearchParams {
    pub fn new(
        search_group: u32,
        query: &Query,
        limit: u32,
        registry: &TypeRegistry,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            search_group,
            queries: query.conditions(registry)?,
            limit,
            check_joinable: false,
            check_watchable: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Encodes a property map as a tagged [`Dict`].
pub fn encode_props(
    props: &Dict,
    registry: &TypeRegistry,
) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = Writer::new(registry);
    writer.write_dict(props)?;
    Ok(writer.into_bytes())
}

/// Decodes a property map. Empty input is an empty map.
pub fn decode_props(
    bytes: &[u8],
    registry: &TypeRegistry,
) -> Result<Dict, ProtocolError> {
    if bytes.is_empty() {
        return Ok(Dict::new());
    }
    Reader::new(registry, bytes).read_dict()
}

/// Builds a [`Dict`] from key/value pairs.
///
/// ```rust
/// use roomwire_protocol::{props, Value};
///
/// let p = props([("level", Value::U8(3)), ("mode", Value::Str("duel".into()))]);
/// assert_eq!(p.len(), 2);
/// ```
pub fn props<K: Into<String>>(
    entries: impl IntoIterator<Item = (K, Value)>,
) -> Dict {
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
