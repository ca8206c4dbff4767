//! Inbound event frames, server to client.
//!
//! ```text
//! regular (type >= 30): | u8 type | u32 be seq | payload |
//! system  (type <  30): | u8 type | payload |
//! ```
//!
//! Regular events are numbered by the server and must arrive in strict
//! sequence; system events sit outside that numbering.

use crate::{
    Dict, MsgType, PlayerId, ProtocolError, Reader, TypeRegistry, Value,
    Writer,
};

/// Event type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EvType {
    PeerReady = 1,
    Joined = 30,
    Left = 31,
    RoomProp = 32,
    ClientProp = 33,
    MasterSwitched = 34,
    Message = 35,
    Succeeded = 128,
    PermissionDenied = 129,
    TargetNotFound = 130,
}

/// Lowest type byte of a regular event.
pub const REGULAR_EVENT_BASE: u8 = 30;

impl EvType {
    /// Whether events of this type carry a sequence number.
    pub fn is_regular(self) -> bool {
        self as u8 >= REGULAR_EVENT_BASE
    }
}

impl TryFrom<u8> for EvType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            1 => Self::PeerReady,
            30 => Self::Joined,
            31 => Self::Left,
            32 => Self::RoomProp,
            33 => Self::ClientProp,
            34 => Self::MasterSwitched,
            35 => Self::Message,
            128 => Self::Succeeded,
            129 => Self::PermissionDenied,
            130 => Self::TargetNotFound,
            other => return Err(ProtocolError::UnknownEvent(other)),
        })
    }
}

/// A decoded event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server is ready for messages; everything up to and including
    /// `last_msg_seq` has been received.
    PeerReady { last_msg_seq: u32 },
    Joined {
        seq: u32,
        player: PlayerId,
        props: Dict,
    },
    Left {
        seq: u32,
        player: PlayerId,
        /// Master after the departure.
        master: PlayerId,
    },
    RoomProp {
        seq: u32,
        client_deadline_secs: u16,
        public_props: Dict,
        private_props: Dict,
    },
    ClientProp {
        seq: u32,
        player: PlayerId,
        props: Dict,
    },
    MasterSwitched { seq: u32, master: PlayerId },
    /// An RPC invocation from another player.
    Message {
        seq: u32,
        sender: PlayerId,
        rpc_id: u8,
        payload: Value,
    },
    /// A message was applied.
    Succeeded { seq: u32, msg_seq: u32 },
    PermissionDenied {
        seq: u32,
        msg_type: MsgType,
        msg_seq: u32,
        payload: Vec<u8>,
    },
    /// Some targets of an RPC were not in the room.
    TargetNotFound {
        seq: u32,
        targets: Vec<PlayerId>,
        msg_type: MsgType,
        msg_seq: u32,
        payload: Vec<u8>,
    },
}

impl Event {
    /// Decodes one complete frame.
    ///
    /// RPC payloads are decoded eagerly, so a frame carrying an
    /// unregistered class id fails here.
    pub fn parse(
        frame: &[u8],
        registry: &TypeRegistry,
    ) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(registry, frame);
        let ev_type = EvType::try_from(r.get_u8()?)?;
        if ev_type == EvType::PeerReady {
            return Ok(Self::PeerReady {
                last_msg_seq: r.get_u24()?,
            });
        }

        let seq = r.get_u32()?;
        let event = match ev_type {
            EvType::PeerReady => {
                return Err(ProtocolError::UnknownEvent(ev_type as u8));
            }
            EvType::Joined => Self::Joined {
                seq,
                player: r.read_str()?.into(),
                props: r.read_dict()?,
            },
            EvType::Left => Self::Left {
                seq,
                player: r.read_str()?.into(),
                master: r.read_str()?.into(),
            },
            EvType::RoomProp => Self::RoomProp {
                seq,
                client_deadline_secs: r.read_u16()?,
                public_props: r.read_dict()?,
                private_props: r.read_dict()?,
            },
            EvType::ClientProp => Self::ClientProp {
                seq,
                player: r.read_str()?.into(),
                props: r.read_dict()?,
            },
            EvType::MasterSwitched => Self::MasterSwitched {
                seq,
                master: r.read_str()?.into(),
            },
            EvType::Message => Self::Message {
                seq,
                sender: r.read_str()?.into(),
                rpc_id: r.get_u8()?,
                payload: r.read()?,
            },
            EvType::Succeeded => Self::Succeeded {
                seq,
                msg_seq: r.get_u24()?,
            },
            EvType::PermissionDenied => Self::PermissionDenied {
                seq,
                msg_type: MsgType::try_from(r.get_u8()?)?,
                msg_seq: r.get_u24()?,
                payload: r.rest().to_vec(),
            },
            EvType::TargetNotFound => Self::TargetNotFound {
                seq,
                targets: r.read_strings()?.into_iter().map(PlayerId).collect(),
                msg_type: MsgType::try_from(r.get_u8()?)?,
                msg_seq: r.get_u24()?,
                payload: r.rest().to_vec(),
            },
        };
        Ok(event)
    }

    pub fn ev_type(&self) -> EvType {
        match self {
            Self::PeerReady { .. } => EvType::PeerReady,
            Self::Joined { .. } => EvType::Joined,
            Self::Left { .. } => EvType::Left,
            Self::RoomProp { .. } => EvType::RoomProp,
            Self::ClientProp { .. } => EvType::ClientProp,
            Self::MasterSwitched { .. } => EvType::MasterSwitched,
            Self::Message { .. } => EvType::Message,
            Self::Succeeded { .. } => EvType::Succeeded,
            Self::PermissionDenied { .. } => EvType::PermissionDenied,
            Self::TargetNotFound { .. } => EvType::TargetNotFound,
        }
    }

    /// The sequence number of a regular event.
    pub fn seq(&self) -> Option<u32> {
        match *self {
            Self::PeerReady { .. } => None,
            Self::Joined { seq, .. }
            | Self::Left { seq, .. }
            | Self::RoomProp { seq, .. }
            | Self::ClientProp { seq, .. }
            | Self::MasterSwitched { seq, .. }
            | Self::Message { seq, .. }
            | Self::Succeeded { seq, .. }
            | Self::PermissionDenied { seq, .. }
            | Self::TargetNotFound { seq, .. } => Some(seq),
        }
    }

    /// Encodes the event the way a room server sends it.
    pub fn to_frame(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut w = Writer::new(registry);
        w.put_u8(self.ev_type() as u8);
        if let Some(seq) = self.seq() {
            w.put_u32(seq);
        }
        match self {
            Self::PeerReady { last_msg_seq } => w.put_u24(*last_msg_seq),
            Self::Joined { player, props, .. }
            | Self::ClientProp { player, props, .. } => {
                w.write_str(player.as_str())?;
                w.write_dict(props)?;
            }
            Self::Left { player, master, .. } => {
                w.write_str(player.as_str())?;
                w.write_str(master.as_str())?;
            }
            Self::RoomProp {
                client_deadline_secs,
                public_props,
                private_props,
                ..
            } => {
                w.write_u16(*client_deadline_secs);
                w.write_dict(public_props)?;
                w.write_dict(private_props)?;
            }
            Self::MasterSwitched { master, .. } => {
                w.write_str(master.as_str())?;
            }
            Self::Message {
                sender,
                rpc_id,
                payload,
                ..
            } => {
                w.write_str(sender.as_str())?;
                w.put_u8(*rpc_id);
                w.write(payload)?;
            }
            Self::Succeeded { msg_seq, .. } => w.put_u24(*msg_seq),
            Self::PermissionDenied {
                msg_type,
                msg_seq,
                payload,
                ..
            } => {
                w.put_u8(*msg_type as u8);
                w.put_u24(*msg_seq);
                w.put_slice(payload);
            }
            Self::TargetNotFound {
                targets,
                msg_type,
                msg_seq,
                payload,
                ..
            } => {
                let ids: Vec<&str> = targets.iter().map(PlayerId::as_str).collect();
                w.write_strings(&ids)?;
                w.put_u8(*msg_type as u8);
                w.put_u24(*msg_seq);
                w.put_slice(payload);
            }
        }
        Ok(w.into_bytes())
    }
}
