//! The application-facing room.
//!
//! A [`Room`] is a local replica of one server-side room. The network
//! work happens in a background session task; the replica itself only
//! changes inside [`Room::process_callback`], which the application calls
//! from its own loop. Handlers therefore run on the application's thread
//! and never race the state they read.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use roomwire_dispatch::{BufferPool, CallbackQueue, CancelSignal};
use roomwire_protocol::{
    AuthToken, Dict, Event, JoinedRoom, PlayerId, RoomId, RoomInfo, RoomPropChange,
    RpcTarget, TypeRegistry, WireValue,
};
use roomwire_transport::{ConnectRequest, Connector};
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};

use crate::events::{Effect, Ignore};
use crate::outbox::{self, Outbox};
use crate::rpc::{RpcContext, RpcTable};
use crate::session::Session;
use crate::{
    DeliveryFailure, EventReceiver, Player, RoomConfig, RoomError, RoomSender, RoomState, Rpc,
};

/// A joined (or watched) room.
pub struct Room {
    info: RoomInfo,
    url: String,
    auth: AuthToken,
    me: PlayerId,
    master: PlayerId,
    players: BTreeMap<PlayerId, Player>,
    public_props: Dict,
    private_props: Dict,
    client_deadline_secs: u32,

    config: RoomConfig,
    registry: Arc<TypeRegistry>,
    queue: CallbackQueue<Effect>,
    pool: BufferPool,
    outbox: Arc<Mutex<Outbox>>,
    wake: Arc<Notify>,
    // Handed to the session on start.
    state_tx: Option<watch::Sender<RoomState>>,
    state_rx: watch::Receiver<RoomState>,
    shutdown: CancelSignal,

    rpcs: RpcTable,
    sender: RoomSender,
    receiver: Box<dyn EventReceiver>,
    running: bool,
    closed: bool,
}

impl Room {
    /// Builds the replica from a lobby response. Nothing connects until
    /// [`start`](Self::start).
    pub fn new(
        joined: JoinedRoom,
        me: impl Into<PlayerId>,
        config: RoomConfig,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self, RoomError> {
        let public_props = joined.room_info.decode_public_props(&registry)?;
        let private_props = joined.room_info.decode_private_props(&registry)?;
        let mut players = BTreeMap::new();
        for client in &joined.players {
            let props = client.decode_props(&registry)?;
            players.insert(client.id.clone(), Player::new(client.id.clone(), props));
        }

        let outbox = Arc::new(Mutex::new(Outbox::new(config.outbox_capacity)));
        let wake = Arc::new(Notify::new());
        let rpcs = RpcTable::new();
        let sender = RoomSender::new(
            Arc::clone(&outbox),
            Arc::clone(&wake),
            Arc::clone(&registry),
            rpcs.ids(),
        );
        let (state_tx, state_rx) = watch::channel(RoomState::Connecting);

        Ok(Self {
            url: joined.url,
            auth: joined.auth,
            me: me.into(),
            master: joined.master_id,
            players,
            public_props,
            private_props,
            client_deadline_secs: joined.deadline_secs,
            pool: BufferPool::new(config.event_pool_size, config.event_buffer_size),
            info: joined.room_info,
            config,
            registry,
            queue: CallbackQueue::new(),
            outbox,
            wake,
            state_tx: Some(state_tx),
            state_rx,
            shutdown: CancelSignal::new(),
            rpcs,
            sender,
            receiver: Box::new(Ignore),
            running: true,
            closed: false,
        })
    }

    /// Spawns the session task on `runtime`.
    ///
    /// # Errors
    /// [`RoomError::AlreadyStarted`] on a second call, [`RoomError::Closed`]
    /// if the room was disconnected before it started.
    pub fn start<C: Connector>(&mut self, connector: C, runtime: &Handle) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::Closed);
        }
        let state = self.state_tx.take().ok_or(RoomError::AlreadyStarted)?;
        let session = Session {
            connector,
            request: ConnectRequest {
                url: self.url.clone(),
                app_id: self.info.app_id.clone(),
                user_id: self.me.to_string(),
                nonce: self.auth.nonce.clone(),
                hash: self.auth.hash.clone(),
                last_event_seq: 0,
            },
            room_id: self.info.id.clone(),
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            queue: self.queue.clone(),
            pool: self.pool.clone(),
            outbox: Arc::clone(&self.outbox),
            wake: Arc::clone(&self.wake),
            state,
            shutdown: self.shutdown.clone(),
        };
        runtime.spawn(session.run());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Callback processing
    // -----------------------------------------------------------------------

    /// Applies every queued event and runs the matching handlers.
    /// Returns how many were processed; nothing runs while paused.
    pub fn process_callback(&mut self) -> Result<usize, RoomError> {
        if !self.running {
            return Ok(0);
        }
        let queue = self.queue.clone();
        let mut receiver = std::mem::replace(&mut self.receiver, Box::new(Ignore));
        let result = queue.drain_with(|effect| self.apply(receiver.as_mut(), effect));
        self.receiver = receiver;
        Ok(result?)
    }

    /// Stops [`process_callback`](Self::process_callback) from running
    /// anything. Events keep queueing, which eventually holds back the
    /// receive loop.
    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn restart(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_event_receiver(&mut self, receiver: impl EventReceiver + 'static) {
        self.receiver = Box::new(receiver);
    }

    fn apply(&mut self, receiver: &mut dyn EventReceiver, effect: Effect) {
        match effect {
            Effect::Event { event, frame } => {
                self.apply_event(receiver, event);
                // Returns the buffer to the pool.
                drop(frame);
            }
            Effect::Error(err) => receiver.on_error(&err),
            Effect::Closed(reason) => {
                self.closed = true;
                receiver.on_closed(&reason);
            }
        }
    }

    fn apply_event(&mut self, receiver: &mut dyn EventReceiver, event: Event) {
        match event {
            Event::Joined { player, props, .. } => {
                let is_me = player == self.me;
                // A player already listed at join time keeps its props.
                let joined = self
                    .players
                    .entry(player.clone())
                    .and_modify(|known| known.merge_props(&props))
                    .or_insert_with(|| Player::new(player, props));
                if is_me {
                    receiver.on_joined(joined);
                } else {
                    receiver.on_other_player_joined(joined);
                }
            }
            Event::Left { player, master, .. } => {
                if master != self.master {
                    let previous = std::mem::replace(&mut self.master, master);
                    receiver.on_master_player_switched(&previous, &self.master);
                }
                match self.players.remove(&player) {
                    Some(left) => receiver.on_other_player_left(&left),
                    None => tracing::warn!(room_id = %self.info.id, player = %player, "unknown player left"),
                }
            }
            Event::RoomProp {
                client_deadline_secs,
                public_props,
                private_props,
                ..
            } => {
                self.client_deadline_secs = u32::from(client_deadline_secs);
                merge(&mut self.public_props, &public_props);
                merge(&mut self.private_props, &private_props);
                receiver.on_room_property_changed(&public_props, &private_props);
            }
            Event::ClientProp { player, props, .. } => match self.players.get_mut(&player) {
                Some(target) => {
                    target.merge_props(&props);
                    receiver.on_player_property_changed(target, &props);
                }
                None => {
                    tracing::warn!(room_id = %self.info.id, player = %player, "props for unknown player")
                }
            },
            Event::MasterSwitched { master, .. } => {
                let previous = std::mem::replace(&mut self.master, master);
                receiver.on_master_player_switched(&previous, &self.master);
            }
            Event::Message {
                sender,
                rpc_id,
                payload,
                ..
            } => {
                let ctx = RpcContext {
                    sender: &sender,
                    room: &self.sender,
                };
                if let Err(err) = self.rpcs.dispatch(rpc_id, &ctx, payload) {
                    tracing::warn!(room_id = %self.info.id, rpc_id, error = %err, "rpc dispatch failed");
                    receiver.on_error(&err);
                }
            }
            Event::Succeeded { msg_seq, .. } => {
                tracing::trace!(room_id = %self.info.id, msg_seq, "message applied");
            }
            Event::PermissionDenied {
                msg_type, msg_seq, ..
            } => {
                receiver.on_error(&RoomError::PermissionDenied { msg_type, msg_seq });
            }
            Event::TargetNotFound {
                targets,
                msg_type,
                msg_seq,
                ..
            } => {
                receiver.on_delivery_failed(&DeliveryFailure {
                    targets,
                    msg_type,
                    msg_seq,
                });
            }
            // Consumed by the receive loop.
            Event::PeerReady { .. } => {}
        }
    }

    // -----------------------------------------------------------------------
    // RPC and messages
    // -----------------------------------------------------------------------

    /// Registers an RPC under the lowest free id.
    pub fn register_rpc<T, F>(&mut self, handler: F) -> Result<Rpc<T>, RoomError>
    where
        T: WireValue,
        F: FnMut(&RpcContext<'_>, T) + Send + 'static,
    {
        self.rpcs.register(handler)
    }

    pub fn register_rpc_with_id<T, F>(&mut self, id: u8, handler: F) -> Result<Rpc<T>, RoomError>
    where
        T: WireValue,
        F: FnMut(&RpcContext<'_>, T) + Send + 'static,
    {
        self.rpcs.register_with_id(id, handler)
    }

    pub fn rpc<T: WireValue>(
        &self,
        rpc: &Rpc<T>,
        payload: T,
        target: RpcTarget,
    ) -> Result<u32, RoomError> {
        self.sender.rpc(rpc, payload, target)
    }

    pub fn leave(&self) -> Result<u32, RoomError> {
        self.sender.leave()
    }

    pub fn change_room_props(&self, change: RoomPropChange) -> Result<u32, RoomError> {
        self.sender.change_room_props(change)
    }

    pub fn change_my_props(&self, props: Dict) -> Result<u32, RoomError> {
        self.sender.change_my_props(props)
    }

    /// A handle for posting messages from elsewhere, e.g. another task.
    pub fn sender(&self) -> RoomSender {
        self.sender.clone()
    }

    /// Drops the connection without leaving. The server keeps the seat
    /// until the client deadline passes. `on_closed` follows on the next
    /// [`process_callback`](Self::process_callback).
    pub fn force_disconnect(&mut self) {
        self.shutdown.cancel();
        // Without a session, nobody else reports the close.
        if let Some(state) = self.state_tx.take() {
            outbox::lock(&self.outbox).close();
            state.send_replace(RoomState::Closed);
            self.queue.enqueue(Effect::Closed("disconnected".into()));
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &RoomId {
        &self.info.id
    }

    /// The lobby's description of the room at join time.
    pub fn info(&self) -> &RoomInfo {
        &self.info
    }

    /// The local player; `None` when watching.
    pub fn me(&self) -> Option<&Player> {
        self.players.get(&self.me)
    }

    pub fn my_id(&self) -> &PlayerId {
        &self.me
    }

    pub fn players(&self) -> &BTreeMap<PlayerId, Player> {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn master(&self) -> &PlayerId {
        &self.master
    }

    pub fn is_master(&self) -> bool {
        self.master == self.me
    }

    pub fn public_props(&self) -> &Dict {
        &self.public_props
    }

    pub fn private_props(&self) -> &Dict {
        &self.private_props
    }

    pub fn client_deadline_secs(&self) -> u32 {
        self.client_deadline_secs
    }

    /// `true` once `on_closed` has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn state(&self) -> RoomState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RoomState> {
        self.state_rx.clone()
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.info.id)
            .field("me", &self.me)
            .field("master", &self.master)
            .field("players", &self.players.len())
            .field("state", &self.state())
            .field("closed", &self.closed)
            .finish()
    }
}

fn merge(target: &mut Dict, changed: &Dict) {
    for (key, value) in changed {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use roomwire_protocol::{ClientInfo, Value, props};

    use super::*;

    fn joined() -> JoinedRoom {
        let registry = TypeRegistry::new();
        JoinedRoom {
            room_info: RoomInfo {
                id: RoomId::from("r1"),
                app_id: "app".into(),
                ..RoomInfo::default()
            },
            url: "memory://r1".into(),
            auth: AuthToken {
                nonce: "n".into(),
                hash: "h".into(),
            },
            deadline_secs: 5,
            players: vec![
                ClientInfo::new("alice", &props([("hp", Value::U8(3))]), &registry).unwrap(),
                ClientInfo::new("bob", &Dict::new(), &registry).unwrap(),
            ],
            master_id: PlayerId::from("bob"),
        }
    }

    fn room() -> Room {
        Room::new(joined(), "alice", RoomConfig::default(), Arc::new(TypeRegistry::new())).unwrap()
    }

    #[derive(Default, Clone)]
    struct Log(Arc<StdMutex<Vec<String>>>);

    impl Log {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl EventReceiver for Log {
        fn on_joined(&mut self, me: &Player) {
            self.0.lock().unwrap().push(format!("joined {}", me.id));
        }
        fn on_other_player_joined(&mut self, player: &Player) {
            self.0.lock().unwrap().push(format!("other joined {}", player.id));
        }
        fn on_other_player_left(&mut self, player: &Player) {
            self.0.lock().unwrap().push(format!("left {}", player.id));
        }
        fn on_master_player_switched(&mut self, previous: &PlayerId, master: &PlayerId) {
            self.0.lock().unwrap().push(format!("master {previous}->{master}"));
        }
        fn on_player_property_changed(&mut self, player: &Player, changed: &Dict) {
            self.0.lock().unwrap().push(format!("props {} {}", player.id, changed.len()));
        }
        fn on_error(&mut self, error: &RoomError) {
            self.0.lock().unwrap().push(format!("error {error}"));
        }
        fn on_closed(&mut self, reason: &str) {
            self.0.lock().unwrap().push(format!("closed {reason}"));
        }
    }

    fn deliver(room: &Room, event: Event) {
        let pool = BufferPool::new(1, 8);
        let frame = pool.try_acquire().unwrap().unwrap();
        room.queue.enqueue(Effect::Event { event, frame });
    }

    #[test]
    fn test_new_decodes_players_and_props() {
        let room = room();
        assert_eq!(room.players().len(), 2);
        assert_eq!(room.me().unwrap().prop("hp"), Some(&Value::U8(3)));
        assert_eq!(room.master(), &PlayerId::from("bob"));
        assert!(!room.is_master());
        assert_eq!(room.state(), RoomState::Connecting);
    }

    #[test]
    fn test_left_master_switches_before_leave_callback() {
        let mut room = room();
        let log = Log::default();
        room.set_event_receiver(log.clone());
        deliver(
            &room,
            Event::Left {
                seq: 1,
                player: PlayerId::from("bob"),
                master: PlayerId::from("alice"),
            },
        );
        assert_eq!(room.process_callback().unwrap(), 1);
        assert_eq!(log.take(), vec!["master bob->alice", "left bob"]);
        assert!(room.is_master());
        assert!(room.player(&PlayerId::from("bob")).is_none());
    }

    #[test]
    fn test_joined_distinguishes_me_from_others() {
        let mut room = room();
        let log = Log::default();
        room.set_event_receiver(log.clone());
        deliver(
            &room,
            Event::Joined {
                seq: 1,
                player: PlayerId::from("alice"),
                props: props([("hp", Value::U8(9))]),
            },
        );
        deliver(
            &room,
            Event::Joined {
                seq: 2,
                player: PlayerId::from("carol"),
                props: Dict::new(),
            },
        );
        room.process_callback().unwrap();
        assert_eq!(log.take(), vec!["joined alice", "other joined carol"]);
        assert_eq!(room.me().unwrap().prop("hp"), Some(&Value::U8(9)));
    }

    #[test]
    fn test_joined_me_merges_into_known_props() {
        let mut room = room();
        let log = Log::default();
        room.set_event_receiver(log.clone());
        deliver(
            &room,
            Event::Joined {
                seq: 1,
                player: PlayerId::from("alice"),
                props: props([("team", Value::Str("red".into()))]),
            },
        );
        room.process_callback().unwrap();
        assert_eq!(log.take(), vec!["joined alice"]);
        let me = room.me().unwrap();
        assert_eq!(me.prop("hp"), Some(&Value::U8(3)));
        assert_eq!(me.prop("team"), Some(&Value::Str("red".into())));
    }

    #[test]
    fn test_client_prop_merges_into_player() {
        let mut room = room();
        let log = Log::default();
        room.set_event_receiver(log.clone());
        deliver(
            &room,
            Event::ClientProp {
                seq: 1,
                player: PlayerId::from("bob"),
                props: props([("ready", Value::Bool(true))]),
            },
        );
        room.process_callback().unwrap();
        assert_eq!(log.take(), vec!["props bob 1"]);
        let bob = room.player(&PlayerId::from("bob")).unwrap();
        assert_eq!(bob.prop("ready"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_pause_holds_callbacks_until_restart() {
        let mut room = room();
        deliver(
            &room,
            Event::MasterSwitched {
                seq: 1,
                master: PlayerId::from("alice"),
            },
        );
        room.pause();
        assert_eq!(room.process_callback().unwrap(), 0);
        assert_eq!(room.master(), &PlayerId::from("bob"));
        room.restart();
        assert_eq!(room.process_callback().unwrap(), 1);
        assert!(room.is_master());
    }

    #[test]
    fn test_force_disconnect_before_start_reports_closed() {
        let mut room = room();
        let log = Log::default();
        room.set_event_receiver(log.clone());
        room.force_disconnect();
        room.process_callback().unwrap();
        assert_eq!(log.take(), vec!["closed disconnected"]);
        assert!(room.is_closed());
        assert_eq!(room.state(), RoomState::Closed);
        assert!(matches!(room.leave(), Err(RoomError::Closed)));
    }

    #[test]
    fn test_permission_denied_reaches_on_error() {
        let mut room = room();
        let log = Log::default();
        room.set_event_receiver(log.clone());
        deliver(
            &room,
            Event::PermissionDenied {
                seq: 1,
                msg_type: roomwire_protocol::MsgType::RoomProp,
                msg_seq: 4,
                payload: Vec::new(),
            },
        );
        room.process_callback().unwrap();
        assert_eq!(log.take(), vec!["error permission denied for RoomProp message 4"]);
    }
}
