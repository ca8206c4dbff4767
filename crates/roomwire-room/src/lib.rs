//! Room sessions for Roomwire.
//!
//! A [`Room`] mirrors one server-side room. Behind it, a background
//! session task keeps a connection open, reconnecting and resuming from
//! the last processed event whenever the link drops.
//!
//! # Key types
//!
//! - [`Room`]: local replica plus the message API
//! - [`EventReceiver`]: the callbacks the application implements
//! - [`RoomSender`]: posts messages from anywhere
//! - [`Rpc`]: a typed handle for a registered remote procedure
//! - [`RoomState`]: connection state machine
//! - [`RoomConfig`]: pool sizes, retry policy, outbox capacity

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod events;
mod outbox;
mod player;
mod room;
mod rpc;
mod sender;
mod session;

pub use config::{GapPolicy, RoomConfig, RoomState};
pub use error::RoomError;
pub use events::{DeliveryFailure, EventReceiver};
pub use player::Player;
pub use room::Room;
pub use rpc::{Rpc, RpcContext};
pub use sender::RoomSender;
