//! Application-facing room notifications.

use roomwire_dispatch::PooledBuf;
use roomwire_protocol::{Dict, Event, MsgType, PlayerId};

use crate::{Player, RoomError};

/// Receives room notifications.
///
/// Every method runs on the thread that calls
/// [`Room::process_callback`](crate::Room::process_callback), in the order
/// the underlying events arrived. All methods default to doing nothing.
pub trait EventReceiver: Send {
    /// The local player entered the room (also after a rejoin).
    fn on_joined(&mut self, me: &Player) {
        let _ = me;
    }

    fn on_other_player_joined(&mut self, player: &Player) {
        let _ = player;
    }

    fn on_other_player_left(&mut self, player: &Player) {
        let _ = player;
    }

    fn on_master_player_switched(&mut self, previous: &PlayerId, master: &PlayerId) {
        let _ = (previous, master);
    }

    /// Room properties changed. Both maps hold only the changed keys.
    fn on_room_property_changed(&mut self, public_props: &Dict, private_props: &Dict) {
        let _ = (public_props, private_props);
    }

    /// A player's properties changed. `player` already carries the new
    /// values; `changed` holds only the changed keys.
    fn on_player_property_changed(&mut self, player: &Player, changed: &Dict) {
        let _ = (player, changed);
    }

    /// Some targets of an RPC were not in the room.
    fn on_delivery_failed(&mut self, failure: &DeliveryFailure) {
        let _ = failure;
    }

    /// A non-fatal problem: a dropped connection about to be retried, a
    /// refused message, an RPC that could not be dispatched.
    fn on_error(&mut self, error: &RoomError) {
        let _ = error;
    }

    /// The room is closed for good. Called once.
    fn on_closed(&mut self, reason: &str) {
        let _ = reason;
    }
}

/// The message that could not reach every target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub targets: Vec<PlayerId>,
    pub msg_type: MsgType,
    pub msg_seq: u32,
}

/// Receiver used until the application sets one.
pub(crate) struct Ignore;

impl EventReceiver for Ignore {}

/// Work handed from the session loops to `process_callback`.
pub(crate) enum Effect {
    /// A decoded event. The frame's pool lease is held until the event
    /// has been applied.
    Event { event: Event, frame: PooledBuf },
    Error(RoomError),
    Closed(String),
}
