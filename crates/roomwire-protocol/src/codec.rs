//! Codec for lobby handshake bodies.
//!
//! Room traffic uses the tagged binary format in [`crate::wire`]. The
//! lobby, on the other hand, speaks plain request/response bodies, and
//! those go through a [`Codec`]. The client manager is generic over it,
//! so a deployment can swap JSON for something more compact without
//! touching any other code.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts handshake bodies to bytes and back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → the codec sits in state shared with the handshake
///   tasks the client spawns, and Tokio may poll those on any worker
///   thread.
/// - `'static` → the codec owns everything it needs, so it can live as
///   long as the client and its tasks do.
///
/// ## Generic methods
///
/// `encode` and `decode` are generic over the body type instead of the
/// trait being generic over it. One codec value therefore handles every
/// handshake: create and join parameters going out, [`JoinedRoom`] and
/// room lists coming back.
///
/// `decode` asks for `DeserializeOwned` rather than `Deserialize<'de>`
/// because the response bytes are dropped right after decoding; the
/// result must not borrow from them.
///
/// [`JoinedRoom`]: crate::JoinedRoom
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use roomwire_protocol::{AuthToken, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let token = AuthToken { nonce: "n1".into(), hash: "ab12".into() };
///
/// let bytes = codec.encode(&token).unwrap();
/// let decoded: AuthToken = codec.decode(&bytes).unwrap();
/// assert_eq!(token, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
