//! Binary encoder and decoder for [`Value`]s.
//!
//! # Layout
//!
//! Every value starts with a one-byte [`Tag`]. Numbers follow big-endian
//! in a byte-sortable form: signed integers have their sign bit flipped,
//! floats have the sign bit set when non-negative and every bit inverted
//! when negative. Two encoded numbers of the same type therefore compare
//! bytewise in numeric order, which is what property queries rely on.
//!
//! ```text
//! Str8   | 13 | u8 len  | utf-8 ... |
//! Str16  | 14 | u16 len | utf-8 ... |
//! Bytes  | 18 | u16 len | raw ...   |
//! List   | 16 | u8 count | (u16 len | tagged value)*             |
//! Dict   | 17 | u8 count | (u8 klen | key | u16 len | tagged value)* |
//! Obj    | 15 | u8 class id | u16 len | payload |
//! ```
//!
//! Elements of lists and dicts carry their own length so a reader can
//! skip or slice them without understanding their type.

use std::any::TypeId;

use crate::{Dict, ObjectValue, ProtocolError, Tag, TypeRegistry, Value, WireObject};

const MAX_SHORT: usize = u8::MAX as usize;
const MAX_LONG: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends encoded values to a byte buffer.
pub struct Writer<'r> {
    buf: Vec<u8>,
    registry: &'r TypeRegistry,
}

impl<'r> Writer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self::with_buffer(registry, Vec::new())
    }

    /// Continues writing after whatever `buf` already holds.
    pub fn with_buffer(registry: &'r TypeRegistry, buf: Vec<u8>) -> Self {
        Self { buf, registry }
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- untagged primitives (frame headers) --

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Low 24 bits of `v`, big-endian.
    pub fn put_u24(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    // -- tagged values --

    pub fn write(&mut self, value: &Value) -> Result<(), ProtocolError> {
        match value {
            Value::Null => self.write_null(),
            Value::Bool(b) => self.write_bool(*b),
            Value::I8(n) => self.write_i8(*n),
            Value::U8(n) => self.write_u8(*n),
            Value::I16(n) => self.write_i16(*n),
            Value::U16(n) => self.write_u16(*n),
            Value::I32(n) => self.write_i32(*n),
            Value::U32(n) => self.write_u32(*n),
            Value::I64(n) => self.write_i64(*n),
            Value::U64(n) => self.write_u64(*n),
            Value::F32(f) => self.write_f32(*f),
            Value::F64(f) => self.write_f64(*f),
            Value::Str(s) => return self.write_str(s),
            Value::List(items) => return self.write_list(items),
            Value::Dict(dict) => return self.write_dict(dict),
            Value::Bytes(bytes) => return self.write_bytes(bytes),
            Value::Object(obj) => return self.write_object_value(obj),
        }
        Ok(())
    }

    pub fn write_null(&mut self) {
        self.put_u8(Tag::Null as u8);
    }

    pub fn write_bool(&mut self, v: bool) {
        let tag = if v { Tag::True } else { Tag::False };
        self.put_u8(tag as u8);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.put_u8(Tag::I8 as u8);
        self.put_u8(v as u8 ^ 0x80);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.put_u8(Tag::U8 as u8);
        self.put_u8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.put_u8(Tag::I16 as u8);
        self.put_slice(&(v as u16 ^ 0x8000).to_be_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.put_u8(Tag::U16 as u8);
        self.put_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.put_u8(Tag::I32 as u8);
        self.put_slice(&(v as u32 ^ 0x8000_0000).to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.put_u8(Tag::U32 as u8);
        self.put_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.put_u8(Tag::I64 as u8);
        self.put_slice(&(v as u64 ^ 0x8000_0000_0000_0000).to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.put_u8(Tag::U64 as u8);
        self.put_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        const SIGN: u32 = 0x8000_0000;
        let bits = v.to_bits();
        let bits = if bits & SIGN != 0 { !bits } else { bits | SIGN };
        self.put_u8(Tag::F32 as u8);
        self.put_slice(&bits.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        const SIGN: u64 = 0x8000_0000_0000_0000;
        let bits = v.to_bits();
        let bits = if bits & SIGN != 0 { !bits } else { bits | SIGN };
        self.put_u8(Tag::F64 as u8);
        self.put_slice(&bits.to_be_bytes());
    }

    /// Uses the one-byte length form whenever the string fits.
    pub fn write_str(&mut self, s: &str) -> Result<(), ProtocolError> {
        let len = s.len();
        if len <= MAX_SHORT {
            self.put_u8(Tag::Str8 as u8);
            self.put_u8(len as u8);
        } else if len <= MAX_LONG {
            self.put_u8(Tag::Str16 as u8);
            self.put_slice(&(len as u16).to_be_bytes());
        } else {
            return Err(too_long("string", len, MAX_LONG));
        }
        self.put_slice(s.as_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| too_long("bytes", bytes.len(), MAX_LONG))?;
        self.put_u8(Tag::Bytes as u8);
        self.put_slice(&len.to_be_bytes());
        self.put_slice(bytes);
        Ok(())
    }

    pub fn write_list(&mut self, items: &[Value]) -> Result<(), ProtocolError> {
        let count = u8::try_from(items.len())
            .map_err(|_| too_long("list", items.len(), MAX_SHORT))?;
        self.put_u8(Tag::List as u8);
        self.put_u8(count);
        for item in items {
            self.length_prefixed("list element", |w| w.write(item))?;
        }
        Ok(())
    }

    /// A list of strings, the shape used for player id lists.
    pub fn write_strings<S: AsRef<str>>(
        &mut self,
        items: &[S],
    ) -> Result<(), ProtocolError> {
        let count = u8::try_from(items.len())
            .map_err(|_| too_long("list", items.len(), MAX_SHORT))?;
        self.put_u8(Tag::List as u8);
        self.put_u8(count);
        for item in items {
            self.length_prefixed("list element", |w| w.write_str(item.as_ref()))?;
        }
        Ok(())
    }

    pub fn write_dict(&mut self, dict: &Dict) -> Result<(), ProtocolError> {
        let count = u8::try_from(dict.len())
            .map_err(|_| too_long("dict", dict.len(), MAX_SHORT))?;
        self.put_u8(Tag::Dict as u8);
        self.put_u8(count);
        for (key, value) in dict {
            let klen = u8::try_from(key.len())
                .map_err(|_| too_long("dict key", key.len(), MAX_SHORT))?;
            self.put_u8(klen);
            self.put_slice(key.as_bytes());
            self.length_prefixed("dict value", |w| w.write(value))?;
        }
        Ok(())
    }

    /// Writes a registered application object.
    ///
    /// # Errors
    /// [`ProtocolError::UnregisteredType`] if `T` has no class id.
    pub fn write_object<T: WireObject>(
        &mut self,
        obj: &T,
    ) -> Result<(), ProtocolError> {
        let class_id = self.class_id(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
        )?;
        self.put_u8(Tag::Obj as u8);
        self.put_u8(class_id);
        self.length_prefixed("object", |w| obj.encode(w))
    }

    fn write_object_value(
        &mut self,
        obj: &ObjectValue,
    ) -> Result<(), ProtocolError> {
        let class_id = self.class_id(obj.type_id(), obj.type_name())?;
        self.put_u8(Tag::Obj as u8);
        self.put_u8(class_id);
        self.length_prefixed("object", |w| obj.encode(w))
    }

    fn class_id(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<u8, ProtocolError> {
        self.registry
            .class_id_of(type_id)
            .ok_or(ProtocolError::UnregisteredType(type_name))
    }

    /// Reserves a u16 length, runs `body`, then patches in its size.
    fn length_prefixed(
        &mut self,
        kind: &'static str,
        body: impl FnOnce(&mut Self) -> Result<(), ProtocolError>,
    ) -> Result<(), ProtocolError> {
        let at = self.buf.len();
        self.put_slice(&[0, 0]);
        body(self)?;
        let len = self.buf.len() - at - 2;
        let len = u16::try_from(len)
            .map_err(|_| too_long(kind, len, MAX_LONG))?;
        self.buf[at..at + 2].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

fn too_long(kind: &'static str, len: usize, max: usize) -> ProtocolError {
    ProtocolError::TooLong { kind, len, max }
}

/// Encodes a single value into a fresh buffer.
pub fn encode(
    value: &Value,
    registry: &TypeRegistry,
) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = Writer::new(registry);
    writer.write(value)?;
    Ok(writer.into_bytes())
}

/// Decodes a single value from the start of `bytes`.
pub fn decode(
    bytes: &[u8],
    registry: &TypeRegistry,
) -> Result<Value, ProtocolError> {
    Reader::new(registry, bytes).read()
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Deepest nesting of lists, dicts and objects a [`Reader`] accepts.
pub const MAX_DEPTH: usize = 64;

/// Reads encoded values from a byte slice.
///
/// Containers are read through sub-readers that inherit their parent's
/// depth, so a hostile frame fails with [`ProtocolError::TooDeep`]
/// instead of exhausting the stack.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
    registry: &'a TypeRegistry,
}

impl<'a> Reader<'a> {
    pub fn new(registry: &'a TypeRegistry, buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
            registry,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything not read yet; consumes it.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    // -- untagged primitives --

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn get_u24(&mut self) -> Result<u32, ProtocolError> {
        let [a, b, c] = self.take_array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    // -- tagged values --

    pub fn read(&mut self) -> Result<Value, ProtocolError> {
        let tag = Tag::try_from(self.get_u8()?)?;
        self.read_body(tag)
    }

    fn read_body(&mut self, tag: Tag) -> Result<Value, ProtocolError> {
        Ok(match tag {
            Tag::Null => Value::Null,
            Tag::False => Value::Bool(false),
            Tag::True => Value::Bool(true),
            Tag::I8 => Value::I8((self.get_u8()? ^ 0x80) as i8),
            Tag::U8 => Value::U8(self.get_u8()?),
            Tag::I16 => Value::I16((self.get_u16()? ^ 0x8000) as i16),
            Tag::U16 => Value::U16(self.get_u16()?),
            Tag::I32 => Value::I32((self.get_u32()? ^ 0x8000_0000) as i32),
            Tag::U32 => Value::U32(self.get_u32()?),
            Tag::I64 => {
                Value::I64((self.get_u64()? ^ 0x8000_0000_0000_0000) as i64)
            }
            Tag::U64 => Value::U64(self.get_u64()?),
            Tag::F32 => {
                const SIGN: u32 = 0x8000_0000;
                let bits = self.get_u32()?;
                let bits = if bits & SIGN != 0 { bits & !SIGN } else { !bits };
                Value::F32(f32::from_bits(bits))
            }
            Tag::F64 => {
                const SIGN: u64 = 0x8000_0000_0000_0000;
                let bits = self.get_u64()?;
                let bits = if bits & SIGN != 0 { bits & !SIGN } else { !bits };
                Value::F64(f64::from_bits(bits))
            }
            Tag::Str8 => {
                let len = self.get_u8()? as usize;
                Value::Str(self.utf8(len)?)
            }
            Tag::Str16 => {
                let len = self.get_u16()? as usize;
                Value::Str(self.utf8(len)?)
            }
            Tag::Bytes => {
                let len = self.get_u16()? as usize;
                Value::Bytes(self.take(len)?.to_vec())
            }
            Tag::List => {
                let count = self.get_u8()? as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.element()?.read()?);
                }
                Value::List(items)
            }
            Tag::Dict => {
                let count = self.get_u8()? as usize;
                let mut dict = Dict::new();
                for _ in 0..count {
                    let klen = self.get_u8()? as usize;
                    let key = self.utf8(klen)?;
                    let value = self.element()?.read()?;
                    dict.insert(key, value);
                }
                Value::Dict(dict)
            }
            Tag::Obj => Value::Object(self.object_body()?),
        })
    }

    fn utf8(&mut self, len: usize) -> Result<String, ProtocolError> {
        Ok(String::from_utf8(self.take(len)?.to_vec())?)
    }

    /// A sub-reader over the next u16-length-prefixed span.
    fn element(&mut self) -> Result<Reader<'a>, ProtocolError> {
        let depth = self.depth + 1;
        if depth > MAX_DEPTH {
            return Err(ProtocolError::TooDeep { max: MAX_DEPTH });
        }
        let len = self.get_u16()? as usize;
        Ok(Reader {
            depth,
            ..Reader::new(self.registry, self.take(len)?)
        })
    }

    fn object_body(&mut self) -> Result<ObjectValue, ProtocolError> {
        let class_id = self.get_u8()?;
        let decode = self
            .registry
            .decoder(class_id)
            .ok_or(ProtocolError::UnknownClass(class_id))?;
        let mut payload = self.element()?;
        decode(&mut payload)
    }

    fn expect(&mut self, tag: Tag, expected: &'static str) -> Result<(), ProtocolError> {
        let found = self.get_u8()?;
        if found != tag as u8 {
            return Err(ProtocolError::TypeMismatch { expected, found });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.get_u8()? {
            t if t == Tag::True as u8 => Ok(true),
            t if t == Tag::False as u8 => Ok(false),
            found => Err(ProtocolError::TypeMismatch {
                expected: "bool",
                found,
            }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.expect(Tag::U8, "u8")?;
        self.get_u8()
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.expect(Tag::U16, "u16")?;
        self.get_u16()
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.expect(Tag::I32, "i32")?;
        Ok((self.get_u32()? ^ 0x8000_0000) as i32)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.expect(Tag::U32, "u32")?;
        self.get_u32()
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.expect(Tag::I64, "i64")?;
        Ok((self.get_u64()? ^ 0x8000_0000_0000_0000) as i64)
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.expect(Tag::U64, "u64")?;
        self.get_u64()
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        match self.read()? {
            Value::F32(f) => Ok(f),
            other => Err(ProtocolError::TypeMismatch {
                expected: "f32",
                found: other.tag() as u8,
            }),
        }
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        match self.read()? {
            Value::F64(f) => Ok(f),
            other => Err(ProtocolError::TypeMismatch {
                expected: "f64",
                found: other.tag() as u8,
            }),
        }
    }

    /// Accepts either string form.
    pub fn read_str(&mut self) -> Result<String, ProtocolError> {
        let len = match self.get_u8()? {
            t if t == Tag::Str8 as u8 => self.get_u8()? as usize,
            t if t == Tag::Str16 as u8 => self.get_u16()? as usize,
            found => {
                return Err(ProtocolError::TypeMismatch {
                    expected: "string",
                    found,
                });
            }
        };
        self.utf8(len)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.expect(Tag::Bytes, "bytes")?;
        let len = self.get_u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_list(&mut self) -> Result<Vec<Value>, ProtocolError> {
        self.expect(Tag::List, "list")?;
        match self.read_body(Tag::List)? {
            Value::List(items) => Ok(items),
            _ => Err(ProtocolError::InvalidMessage("list body".into())),
        }
    }

    /// A list whose elements are all strings.
    pub fn read_strings(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.expect(Tag::List, "list")?;
        let count = self.get_u8()? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.element()?.read_str()?);
        }
        Ok(items)
    }

    pub fn read_dict(&mut self) -> Result<Dict, ProtocolError> {
        self.expect(Tag::Dict, "dict")?;
        match self.read_body(Tag::Dict)? {
            Value::Dict(dict) => Ok(dict),
            _ => Err(ProtocolError::InvalidMessage("dict body".into())),
        }
    }

    /// Reads an object and checks it is a `T`.
    pub fn read_object<T: WireObject>(&mut self) -> Result<T, ProtocolError> {
        self.expect(Tag::Obj, "object")?;
        self.object_body()?
            .downcast::<T>()
            .ok_or(ProtocolError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: Tag::Obj as u8,
            })
    }
}
