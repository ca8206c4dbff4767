//! Outbound message frames, client to server.
//!
//! ```text
//! | u8 type | u24 be seq | payload |
//! ```
//!
//! Sequence numbers start at 1 per session and are 24 bits wide.

use crate::{Dict, PlayerId, ProtocolError, Reader, TypeRegistry, Value, Writer};

/// Largest message sequence number.
pub const MAX_MSG_SEQ: u32 = 0x00ff_ffff;

const FLAG_VISIBLE: u8 = 1;
const FLAG_JOINABLE: u8 = 2;
const FLAG_WATCHABLE: u8 = 4;

/// Message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Leave = 30,
    RoomProp = 31,
    ClientProp = 32,
    Targets = 33,
    ToMaster = 34,
    Broadcast = 35,
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            30 => Self::Leave,
            31 => Self::RoomProp,
            32 => Self::ClientProp,
            33 => Self::Targets,
            34 => Self::ToMaster,
            35 => Self::Broadcast,
            other => return Err(ProtocolError::UnknownMessage(other)),
        })
    }
}

/// Who receives an RPC.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RpcTarget {
    /// Every other player in the room.
    #[default]
    Broadcast,
    /// The current master only.
    Master,
    /// The listed players.
    Players(Vec<PlayerId>),
}

impl RpcTarget {
    /// An explicit target list. An empty list means broadcast.
    pub fn players<I, P>(ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PlayerId>,
    {
        let ids: Vec<PlayerId> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            Self::Broadcast
        } else {
            Self::Players(ids)
        }
    }
}

/// New room settings, sent by the master.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomPropChange {
    pub visible: bool,
    pub joinable: bool,
    pub watchable: bool,
    pub search_group: u32,
    pub max_players: u16,
    pub client_deadline_secs: u16,
    /// Keys to set; other keys are untouched.
    pub public_props: Dict,
    pub private_props: Dict,
}

/// A message to the room server.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Leave,
    RoomProp(RoomPropChange),
    /// Keys of the sender's own properties to set.
    ClientProp(Dict),
    Rpc {
        target: RpcTarget,
        rpc_id: u8,
        payload: Value,
    },
}

impl Msg {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Leave => MsgType::Leave,
            Self::RoomProp(_) => MsgType::RoomProp,
            Self::ClientProp(_) => MsgType::ClientProp,
            Self::Rpc { target, .. } => match target {
                RpcTarget::Broadcast => MsgType::Broadcast,
                RpcTarget::Master => MsgType::ToMaster,
                RpcTarget::Players(_) => MsgType::Targets,
            },
        }
    }

    /// Encodes the message with sequence number `seq`.
    ///
    /// # Errors
    /// [`ProtocolError::SequenceOverflow`] if `seq` needs more than 24
    /// bits, or any payload encoding error.
    pub fn encode(
        &self,
        seq: u32,
        registry: &TypeRegistry,
    ) -> Result<Vec<u8>, ProtocolError> {
        if seq > MAX_MSG_SEQ {
            return Err(ProtocolError::SequenceOverflow(seq));
        }
        let mut w = Writer::new(registry);
        w.put_u8(self.msg_type() as u8);
        w.put_u24(seq);
        match self {
            Self::Leave => {}
            Self::RoomProp(change) => {
                let mut flags = 0;
                if change.visible {
                    flags |= FLAG_VISIBLE;
                }
                if change.joinable {
                    flags |= FLAG_JOINABLE;
                }
                if change.watchable {
                    flags |= FLAG_WATCHABLE;
                }
                w.write_u8(flags);
                w.write_u32(change.search_group);
                w.write_u16(change.max_players);
                w.write_u16(change.client_deadline_secs);
                w.write_dict(&change.public_props)?;
                w.write_dict(&change.private_props)?;
            }
            Self::ClientProp(props) => w.write_dict(props)?,
            Self::Rpc {
                target,
                rpc_id,
                payload,
            } => {
                if let RpcTarget::Players(ids) = target {
                    let ids: Vec<&str> = ids.iter().map(PlayerId::as_str).collect();
                    w.write_strings(&ids)?;
                }
                w.put_u8(*rpc_id);
                w.write(payload)?;
            }
        }
        Ok(w.into_bytes())
    }

    /// Decodes a frame into its sequence number and message, as a room
    /// server would.
    pub fn parse(
        frame: &[u8],
        registry: &TypeRegistry,
    ) -> Result<(u32, Self), ProtocolError> {
        let mut r = Reader::new(registry, frame);
        let msg_type = MsgType::try_from(r.get_u8()?)?;
        let seq = r.get_u24()?;
        let msg = match msg_type {
            MsgType::Leave => Self::Leave,
            MsgType::RoomProp => {
                let flags = r.read_u8()?;
                Self::RoomProp(RoomPropChange {
                    visible: flags & FLAG_VISIBLE != 0,
                    joinable: flags & FLAG_JOINABLE != 0,
                    watchable: flags & FLAG_WATCHABLE != 0,
                    search_group: r.read_u32()?,
                    max_players: r.read_u16()?,
                    client_deadline_secs: r.read_u16()?,
                    public_props: r.read_dict()?,
                    private_props: r.read_dict()?,
                })
            }
            MsgType::ClientProp => Self::ClientProp(r.read_dict()?),
            MsgType::Targets | MsgType::ToMaster | MsgType::Broadcast => {
                let target = match msg_type {
                    MsgType::Targets => RpcTarget::Players(
                        r.read_strings()?.into_iter().map(PlayerId).collect(),
                    ),
                    MsgType::ToMaster => RpcTarget::Master,
                    _ => RpcTarget::Broadcast,
                };
                Self::Rpc {
                    target,
                    rpc_id: r.get_u8()?,
                    payload: r.read()?,
                }
            }
        };
        Ok((seq, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    #[test]
    fn test_leave_frame_layout() {
        let frame = Msg::Leave.encode(0x0a0b0c, &TypeRegistry::new()).unwrap();
        assert_eq!(frame, vec![30, 0x0a, 0x0b, 0x0c]);
    }

    #[test]
    fn test_encode_seq_over_24_bits_fails() {
        let err = Msg::Leave.encode(MAX_MSG_SEQ + 1, &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, ProtocolError::SequenceOverflow(_)));
    }

    #[test]
    fn test_rpc_target_selects_message_type() {
        let rpc = |target| Msg::Rpc {
            target,
            rpc_id: 0,
            payload: Value::Null,
        };
        assert_eq!(rpc(RpcTarget::Broadcast).msg_type(), MsgType::Broadcast);
        assert_eq!(rpc(RpcTarget::Master).msg_type(), MsgType::ToMaster);
        assert_eq!(
            rpc(RpcTarget::players(["bob"])).msg_type(),
            MsgType::Targets
        );
    }

    #[test]
    fn test_rpc_target_empty_list_is_broadcast() {
        assert_eq!(RpcTarget::players(Vec::<PlayerId>::new()), RpcTarget::Broadcast);
    }

    #[test]
    fn test_targeted_rpc_parses_back() {
        let registry = TypeRegistry::new();
        let msg = Msg::Rpc {
            target: RpcTarget::players(["bob", "carol"]),
            rpc_id: 3,
            payload: Value::I16(-7),
        };
        let frame = msg.encode(12, &registry).unwrap();
        assert_eq!(Msg::parse(&frame, &registry).unwrap(), (12, msg));
    }

    #[test]
    fn test_room_prop_flags_parse_back() {
        let registry = TypeRegistry::new();
        let msg = Msg::RoomProp(RoomPropChange {
            visible: true,
            joinable: false,
            watchable: true,
            search_group: 7,
            max_players: 4,
            client_deadline_secs: 30,
            public_props: props([("map", Value::Str("dunes".into()))]),
            private_props: Dict::new(),
        });
        let frame = msg.encode(1, &registry).unwrap();
        // Tagged u8 flags right after the header.
        assert_eq!(&frame[4..6], &[4, 0b101]);
        assert_eq!(Msg::parse(&frame, &registry).unwrap().1, msg);
    }

    #[test]
    fn test_parse_unknown_message_type_fails() {
        let err = Msg::parse(&[1, 0, 0, 1], &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownMessage(1)));
    }
}
