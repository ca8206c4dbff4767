//! Wire protocol for Roomwire.
//!
//! This crate defines the "language" a room client speaks:
//!
//! - **Values** ([`Value`], [`WireObject`], [`WireValue`]) and the tagged
//!   binary codec ([`Writer`], [`Reader`]) with its class id
//!   [`TypeRegistry`].
//! - **Frames**: inbound [`Event`]s and outbound [`Msg`]s.
//! - **Handshake types** ([`JoinedRoom`], [`RoomOption`], [`Query`], ...)
//!   exchanged with the lobby through a [`Codec`].
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the room
//! session. It knows nothing about connections; it only turns bytes into
//! typed frames and back.
//!
//! ```text
//! Transport (frames) → Protocol (Event / Msg) → Room (state, callbacks)
//! ```

mod codec;
mod error;
mod event;
mod msg;
mod query;
mod registry;
mod types;
mod value;
pub mod wire;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{EvType, Event, REGULAR_EVENT_BASE};
pub use msg::{MAX_MSG_SEQ, Msg, MsgType, RoomPropChange, RpcTarget};
pub use query::{Condition, Op, Query};
pub use registry::TypeRegistry;
pub use types::{
    AuthToken, ClientInfo, CreateParams, JoinParams, JoinedRoom, PlayerId,
    RoomId, RoomInfo, RoomOption, SearchParams, decode_props, encode_props,
    props,
};
pub use value::{Dict, ObjectValue, Tag, Value, WireObject, WireValue};
pub use wire::{Reader, Writer};
