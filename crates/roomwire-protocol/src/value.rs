//! The dynamic value model carried by the wire codec.
//!
//! Room properties, player properties, and RPC payloads are all
//! [`Value`]s. Application types join the model in one of two ways:
//!
//! - implement [`WireObject`] and register the type under a one-byte class
//!   id in a [`TypeRegistry`](crate::TypeRegistry); the value then travels
//!   as [`Value::Object`], or
//! - implement [`WireValue`] to convert to and from a plain `Value`.
//!
//! Every `WireObject` is automatically a `WireValue`.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;

use crate::{ProtocolError, Reader, Writer};

/// A key-ordered property map.
pub type Dict = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// The one-byte type tag that prefixes every encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    False = 1,
    True = 2,
    I8 = 3,
    U8 = 4,
    I16 = 5,
    U16 = 6,
    I32 = 7,
    U32 = 8,
    I64 = 9,
    U64 = 10,
    F32 = 11,
    F64 = 12,
    Str8 = 13,
    Str16 = 14,
    Obj = 15,
    List = 16,
    Dict = 17,
    Bytes = 18,
}

impl TryFrom<u8> for Tag {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0 => Self::Null,
            1 => Self::False,
            2 => Self::True,
            3 => Self::I8,
            4 => Self::U8,
            5 => Self::I16,
            6 => Self::U16,
            7 => Self::I32,
            8 => Self::U32,
            9 => Self::I64,
            10 => Self::U64,
            11 => Self::F32,
            12 => Self::F64,
            13 => Self::Str8,
            14 => Self::Str16,
            15 => Self::Obj,
            16 => Self::List,
            17 => Self::Dict,
            18 => Self::Bytes,
            other => return Err(ProtocolError::UnknownTag(other)),
        })
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A self-describing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Encoded as a short string when it fits in 255 bytes, long otherwise.
    Str(String),
    List(Vec<Value>),
    Dict(Dict),
    Bytes(Vec<u8>),
    /// A registered application type.
    Object(ObjectValue),
}

impl Value {
    /// Wraps a registered application type.
    pub fn object<T: WireObject>(obj: T) -> Self {
        Self::Object(ObjectValue::new(obj))
    }

    /// The tag this value is encoded with.
    pub fn tag(&self) -> Tag {
        match self {
            Self::Null => Tag::Null,
            Self::Bool(false) => Tag::False,
            Self::Bool(true) => Tag::True,
            Self::I8(_) => Tag::I8,
            Self::U8(_) => Tag::U8,
            Self::I16(_) => Tag::I16,
            Self::U16(_) => Tag::U16,
            Self::I32(_) => Tag::I32,
            Self::U32(_) => Tag::U32,
            Self::I64(_) => Tag::I64,
            Self::U64(_) => Tag::U64,
            Self::F32(_) => Tag::F32,
            Self::F64(_) => Tag::F64,
            Self::Str(s) if s.len() <= u8::MAX as usize => Tag::Str8,
            Self::Str(_) => Tag::Str16,
            Self::List(_) => Tag::List,
            Self::Dict(_) => Tag::Dict,
            Self::Bytes(_) => Tag::Bytes,
            Self::Object(_) => Tag::Obj,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Any integer variant, widened.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::I8(n) => n.into(),
            Self::U8(n) => n.into(),
            Self::I16(n) => n.into(),
            Self::U16(n) => n.into(),
            Self::I32(n) => n.into(),
            Self::U32(n) => n.into(),
            Self::I64(n) => n.into(),
            Self::U64(n) => n.into(),
            _ => return None,
        })
    }

    /// Borrows the application object if it is a `T`.
    pub fn as_object<T: WireObject>(&self) -> Option<&T> {
        match self {
            Self::Object(obj) => obj.downcast_ref(),
            _ => None,
        }
    }

    fn mismatch(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::TypeMismatch {
            expected,
            found: self.tag() as u8,
        }
    }
}

// ---------------------------------------------------------------------------
// WireObject
// ---------------------------------------------------------------------------

/// An application type with its own wire encoding.
///
/// The type must be registered in a
/// [`TypeRegistry`](crate::TypeRegistry) before it can be encoded or
/// decoded. `encode` writes the payload only; the codec adds the class id
/// and length prefix around it.
///
/// ## Trait bounds explained
///
/// - `Any` → a decoded object travels as a type-erased
///   [`ObjectValue`] and is recovered with a downcast, which needs the
///   concrete type's `TypeId`.
/// - `Clone + PartialEq + Debug` → objects sit inside [`Value`]s, and
///   `Value` is cloned, compared and logged like any other data.
/// - `Send + Sync` → decoded payloads cross from the session task to the
///   application thread inside queued events.
///
/// ## Why not serde?
///
/// The wire format is fixed by the room server and sorts numerically
/// bytewise, so a payload is written field by field with the same
/// [`Writer`](crate::Writer) calls the built-in types use. The payload
/// is its own length-prefixed span, so a reader that does not know the
/// class can still skip it.
///
/// ```rust
/// use roomwire_protocol::{ProtocolError, Reader, WireObject, Writer};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl WireObject for Position {
///     fn encode(&self, w: &mut Writer<'_>) -> Result<(), ProtocolError> {
///         w.write_f32(self.x);
///         w.write_f32(self.y);
///         Ok(())
///     }
///
///     fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
///         Ok(Self { x: r.read_f32()?, y: r.read_f32()? })
///     }
/// }
/// ```
pub trait WireObject: Any + Clone + PartialEq + fmt::Debug + Send + Sync {
    fn encode(&self, writer: &mut Writer<'_>) -> Result<(), ProtocolError>;

    fn decode(reader: &mut Reader<'_>) -> Result<Self, ProtocolError>;
}

/// Object-safe face of [`WireObject`].
trait DynObject: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_box(&self) -> Box<dyn DynObject>;
    fn eq_dyn(&self, other: &dyn DynObject) -> bool;
    fn encode_dyn(&self, writer: &mut Writer<'_>) -> Result<(), ProtocolError>;
    fn type_name(&self) -> &'static str;
}

impl<T: WireObject> DynObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_box(&self) -> Box<dyn DynObject> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn DynObject) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn encode_dyn(&self, writer: &mut Writer<'_>) -> Result<(), ProtocolError> {
        self.encode(writer)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A type-erased [`WireObject`] inside a [`Value`].
pub struct ObjectValue(Box<dyn DynObject>);

impl ObjectValue {
    pub fn new<T: WireObject>(obj: T) -> Self {
        Self(Box::new(obj))
    }

    pub fn downcast_ref<T: WireObject>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    /// Unwraps the object if it is a `T`.
    pub fn downcast<T: WireObject>(self) -> Option<T> {
        self.0.into_any().downcast::<T>().ok().map(|obj| *obj)
    }

    /// Name of the wrapped Rust type.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.0.as_any().type_id()
    }

    pub(crate) fn encode(
        &self,
        writer: &mut Writer<'_>,
    ) -> Result<(), ProtocolError> {
        self.0.encode_dyn(writer)
    }
}

impl Clone for ObjectValue {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_dyn(other.0.as_ref())
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

// ---------------------------------------------------------------------------
// WireValue
// ---------------------------------------------------------------------------

/// Conversion between an RPC payload type and [`Value`].
pub trait WireValue: Sized + Send + 'static {
    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, ProtocolError>;
}

impl WireValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        Ok(value)
    }
}

impl<T: WireObject> WireValue for T {
    fn into_value(self) -> Value {
        Value::object(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let expected = std::any::type_name::<T>();
        match value {
            Value::Object(obj) => obj.downcast().ok_or(
                ProtocolError::TypeMismatch {
                    expected,
                    found: Tag::Obj as u8,
                },
            ),
            other => Err(other.mismatch(expected)),
        }
    }
}

impl WireValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(other.mismatch("bool")),
        }
    }
}

// Integers accept any integer variant whose value fits.
macro_rules! int_wire_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl WireValue for $ty {
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, ProtocolError> {
                value
                    .as_i128()
                    .and_then(|n| <$ty>::try_from(n).ok())
                    .ok_or_else(|| value.mismatch(stringify!($ty)))
            }
        }
    )*};
}

int_wire_value! {
    i8 => I8, u8 => U8, i16 => I16, u16 => U16,
    i32 => I32, u32 => U32, i64 => I64, u64 => U64,
}

impl WireValue for f32 {
    fn into_value(self) -> Value {
        Value::F32(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::F32(f) => Ok(f),
            other => Err(other.mismatch("f32")),
        }
    }
}

impl WireValue for f64 {
    fn into_value(self) -> Value {
        Value::F64(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::F64(f) => Ok(f),
            Value::F32(f) => Ok(f.into()),
            other => Err(other.mismatch("f64")),
        }
    }
}

impl WireValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }
}

impl WireValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(other.mismatch("bytes")),
        }
    }
}

impl WireValue for Dict {
    fn into_value(self) -> Value {
        Value::Dict(self)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Dict(d) => Ok(d),
            other => Err(other.mismatch("dict")),
        }
    }
}
