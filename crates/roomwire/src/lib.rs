//! # Roomwire
//!
//! Client library for realtime multiplayer rooms.
//!
//! A [`Client`] talks to a lobby to create, join, watch or search rooms.
//! Every joined room is a [`Room`]: a local replica kept in sync by a
//! background session that survives dropped connections by resuming
//! exactly where it left off, in both directions. The application drives
//! everything from one call per tick, [`Client::process_callback`], so
//! room state and handlers only ever run on the application's thread.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roomwire::prelude::*;
//!
//! let mut client = ClientBuilder::new("my-app", "alice")
//!     .with_bearer(token)
//!     .build(my_lobby, WebSocketConnector::default())?;
//!
//! client.random_join(0, &Query::new(), &Dict::new(), |room| {
//!     room.set_event_receiver(MyReceiver::default());
//!     true
//! }, |err| eprintln!("join failed: {err}"));
//!
//! loop {
//!     client.process_callback()?;
//!     // render, read input, ...
//! }
//! ```

#![allow(async_fn_in_trait)]

mod client;
mod error;
pub mod lobby;

pub use client::{Client, ClientBuilder, ClientConfig, SearchOptions};
pub use error::ClientError;
pub use lobby::{Lobby, LobbyError, LobbyRequest};

pub use roomwire_protocol as protocol;
pub use roomwire_room as room;
pub use roomwire_transport as transport;

pub use roomwire_room::{
    DeliveryFailure, EventReceiver, GapPolicy, Player, Room, RoomConfig, RoomError, RoomSender,
    RoomState, Rpc, RpcContext,
};

pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ClientError, EventReceiver, Lobby, LobbyError,
        LobbyRequest, Player, Room, RoomConfig, RoomSender, Rpc, RpcContext, SearchOptions,
    };
    pub use roomwire_protocol::{
        Dict, PlayerId, Query, RoomId, RoomInfo, RoomOption, RoomPropChange, RpcTarget,
        TypeRegistry, Value, WireObject, WireValue, props,
    };
    #[cfg(feature = "websocket")]
    pub use roomwire_transport::WebSocketConnector;
}
