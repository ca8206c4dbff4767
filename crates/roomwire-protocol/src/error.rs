//! Error types for the protocol layer.
//!
//! Each crate in Roomwire defines its own error enum. A `ProtocolError`
//! always means the bytes (or the type registry) were wrong, never the
//! network or the room.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization of a handshake body failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization of a handshake body failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The input ended before a complete value was read.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A value started with a tag byte this codec does not know.
    #[error("unknown type tag {0}")]
    UnknownTag(u8),

    /// A value had a different tag than the reader asked for.
    #[error("type mismatch: expected {expected}, found tag {found}")]
    TypeMismatch { expected: &'static str, found: u8 },

    /// An object value carried a class id that is not registered.
    #[error("class id {0} is not registered")]
    UnknownClass(u8),

    /// An object value of an unregistered Rust type was encoded.
    #[error("type {0} is not registered")]
    UnregisteredType(&'static str),

    /// Registering a second type under an already used class id.
    #[error("class id {class_id} already registered for {existing}")]
    DuplicateClass {
        class_id: u8,
        existing: &'static str,
    },

    /// Registering the same type twice.
    #[error("type {type_name} already registered as class id {class_id}")]
    DuplicateType {
        type_name: &'static str,
        class_id: u8,
    },

    /// A string, list, dict, or byte span exceeds its length prefix.
    #[error("{kind} too long: {len} exceeds {max}")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    /// Lists, dicts or objects nested deeper than the reader allows.
    #[error("value nested deeper than {max} levels")]
    TooDeep { max: usize },

    /// String bytes were not valid UTF-8.
    #[error("invalid utf-8 in string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An event frame carried an unknown event type.
    #[error("unknown event type {0}")]
    UnknownEvent(u8),

    /// A message frame carried an unknown message type.
    #[error("unknown message type {0}")]
    UnknownMessage(u8),

    /// Outgoing message sequence numbers are 24 bits wide.
    #[error("message sequence number {0} does not fit in 24 bits")]
    SequenceOverflow(u32),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
