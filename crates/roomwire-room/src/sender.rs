use std::sync::{Arc, Mutex};

use roomwire_protocol::{Dict, Msg, RoomPropChange, RpcTarget, TypeRegistry, WireValue};
use tokio::sync::Notify;

use crate::outbox::{self, Outbox};
use crate::rpc::{self, Rpc, RpcIds};
use crate::RoomError;

/// Posts messages to a room. Cloning shares the room's outbox.
///
/// Posting never waits for the network: the message is encoded, given
/// the next sequence number, and retained until the server has it. Each
/// method returns that sequence number.
#[derive(Clone)]
pub struct RoomSender {
    outbox: Arc<Mutex<Outbox>>,
    wake: Arc<Notify>,
    registry: Arc<TypeRegistry>,
    rpc_ids: RpcIds,
}

impl RoomSender {
    pub(crate) fn new(
        outbox: Arc<Mutex<Outbox>>,
        wake: Arc<Notify>,
        registry: Arc<TypeRegistry>,
        rpc_ids: RpcIds,
    ) -> Self {
        Self {
            outbox,
            wake,
            registry,
            rpc_ids,
        }
    }

    /// Invokes `rpc` on `target`.
    ///
    /// # Errors
    /// [`RoomError::RpcNotRegistered`] if `rpc` came from another room's
    /// table.
    pub fn rpc<T: WireValue>(
        &self,
        rpc: &Rpc<T>,
        payload: T,
        target: RpcTarget,
    ) -> Result<u32, RoomError> {
        rpc::check_registered(&self.rpc_ids, rpc)?;
        self.post(&Msg::Rpc {
            target,
            rpc_id: rpc.id(),
            payload: payload.into_value(),
        })
    }

    /// Leaves the room. The server closes the connection once it has
    /// processed the message.
    pub fn leave(&self) -> Result<u32, RoomError> {
        self.post(&Msg::Leave)
    }

    /// Changes room settings and properties. Master only; the server
    /// answers others with a permission error.
    pub fn change_room_props(&self, change: RoomPropChange) -> Result<u32, RoomError> {
        self.post(&Msg::RoomProp(change))
    }

    /// Sets keys of the local player's properties.
    pub fn change_my_props(&self, props: Dict) -> Result<u32, RoomError> {
        self.post(&Msg::ClientProp(props))
    }

    fn post(&self, msg: &Msg) -> Result<u32, RoomError> {
        let seq = outbox::lock(&self.outbox).post(msg, &self.registry)?;
        tracing::trace!(msg_seq = seq, msg_type = ?msg.msg_type(), "message queued");
        self.wake.notify_one();
        Ok(seq)
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(
            Arc::new(Mutex::new(Outbox::new(8))),
            Arc::new(Notify::new()),
            Arc::new(TypeRegistry::new()),
            RpcIds::default(),
        )
    }
}

impl std::fmt::Debug for RoomSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSender")
            .field("queued", &outbox::lock(&self.outbox).len())
            .finish()
    }
}
