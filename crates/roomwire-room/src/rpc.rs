//! Typed remote procedure calls.
//!
//! An RPC is a one-byte id bound to a payload type and a handler. Every
//! client of a room must register the same RPCs in the same order (or
//! with the same explicit ids) so that ids agree on both ends.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use roomwire_protocol::{PlayerId, ProtocolError, Value, WireValue};

use crate::{RoomError, RoomSender};

/// Handle for invoking a registered RPC.
pub struct Rpc<T> {
    id: u8,
    _payload: PhantomData<fn(T)>,
}

impl<T> Rpc<T> {
    pub fn id(&self) -> u8 {
        self.id
    }
}

impl<T> Clone for Rpc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Rpc<T> {}

impl<T> std::fmt::Debug for Rpc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rpc")
            .field("id", &self.id)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}

/// What a handler knows about the call it is serving.
pub struct RpcContext<'a> {
    /// The invoking player.
    pub sender: &'a PlayerId,
    /// For replies and follow-up messages.
    pub room: &'a RoomSender,
}

type Handler =
    Box<dyn FnMut(&RpcContext<'_>, Value) -> Result<(), ProtocolError> + Send>;

/// Payload type per registered id, shared with every [`RoomSender`].
pub(crate) type RpcIds = Arc<RwLock<HashMap<u8, TypeId>>>;

pub(crate) struct RpcTable {
    handlers: HashMap<u8, Handler>,
    ids: RpcIds,
}

impl RpcTable {
    pub(crate) fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            ids: RpcIds::default(),
        }
    }

    pub(crate) fn ids(&self) -> RpcIds {
        Arc::clone(&self.ids)
    }

    /// Registers `handler` under the lowest free id.
    pub(crate) fn register<T, F>(&mut self, handler: F) -> Result<Rpc<T>, RoomError>
    where
        T: WireValue,
        F: FnMut(&RpcContext<'_>, T) + Send + 'static,
    {
        let id = (0..=u8::MAX)
            .find(|id| !self.handlers.contains_key(id))
            .ok_or(RoomError::RpcTableFull)?;
        self.register_with_id(id, handler)
    }

    pub(crate) fn register_with_id<T, F>(
        &mut self,
        id: u8,
        mut handler: F,
    ) -> Result<Rpc<T>, RoomError>
    where
        T: WireValue,
        F: FnMut(&RpcContext<'_>, T) + Send + 'static,
    {
        if self.handlers.contains_key(&id) {
            return Err(RoomError::DuplicateRpc(id));
        }
        self.handlers.insert(
            id,
            Box::new(move |ctx, payload| {
                handler(ctx, T::from_value(payload)?);
                Ok(())
            }),
        );
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, TypeId::of::<T>());
        Ok(Rpc {
            id,
            _payload: PhantomData,
        })
    }

    /// Runs the handler for `id`.
    ///
    /// # Errors
    /// [`RoomError::UnknownRpc`] if nothing is registered under `id`; a
    /// protocol error if the payload does not convert to the handler's
    /// type.
    pub(crate) fn dispatch(
        &mut self,
        id: u8,
        ctx: &RpcContext<'_>,
        payload: Value,
    ) -> Result<(), RoomError> {
        let handler = self
            .handlers
            .get_mut(&id)
            .ok_or(RoomError::UnknownRpc(id))?;
        handler(ctx, payload)?;
        Ok(())
    }
}

/// Checks that `rpc` was registered with payload type `T`.
pub(crate) fn check_registered<T: 'static>(
    ids: &RpcIds,
    rpc: &Rpc<T>,
) -> Result<(), RoomError> {
    let ids = ids.read().unwrap_or_else(PoisonError::into_inner);
    match ids.get(&rpc.id) {
        Some(type_id) if *type_id == TypeId::of::<T>() => Ok(()),
        _ => Err(RoomError::RpcNotRegistered(rpc.id)),
    }
}
