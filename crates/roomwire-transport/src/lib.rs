//! Transport abstraction layer for Roomwire.
//!
//! A room session talks to the game server over one duplex connection
//! per attempt. [`Connector`] opens that connection and hands back the
//! two halves: a [`FrameSink`] owned by the send loop and a
//! [`FrameStream`] owned by the receive loop. Splitting the halves lets
//! both loops run concurrently without locking each other out.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`
//! - `memory`: in-process scripted transport for tests and demos

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketSink, WebSocketStream};

/// Close code for a normal, deliberate close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when the endpoint is going away or unavailable.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Returns `true` if a close with this code ends the session for good.
///
/// Only normal closure and endpoint-unavailable are terminal; every other
/// code (abnormal closure, internal error, ...) is worth a reconnect.
pub fn is_terminal_close(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}

// ---------------------------------------------------------------------------
// ConnectRequest
// ---------------------------------------------------------------------------

/// Everything needed to open (or re-open) a room connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// The room endpoint, e.g. `wss://game-1.example.com/room/abc`.
    pub url: String,
    /// Application id registered with the service.
    pub app_id: String,
    /// Id of the connecting player.
    pub user_id: String,
    /// Auth token nonce.
    pub nonce: String,
    /// Auth token hash.
    pub hash: String,
    /// Last inbound event sequence number processed by the client.
    /// The server resumes delivery right after it.
    pub last_event_seq: u32,
}

impl ConnectRequest {
    /// The connect-time headers, names in lowercase wire form.
    pub fn headers(&self) -> [(&'static str, String); 5] {
        [
            ("x-roomwire-app", self.app_id.clone()),
            ("x-roomwire-user", self.user_id.clone()),
            ("x-roomwire-nonce", self.nonce.clone()),
            ("x-roomwire-hash", self.hash.clone()),
            ("x-roomwire-last-event-seq", self.last_event_seq.to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

/// One read from a [`FrameStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Part of a frame. `last` is set on the chunk that completes it.
    Chunk { data: Vec<u8>, last: bool },
    /// The peer closed the connection.
    Close { code: u16, reason: String },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Opens connections to a room server.
///
/// The session calls `connect` once per attempt, including every
/// reconnect, with a fresh [`ConnectRequest`] whose `last_event_seq`
/// tells the server where to resume. The connector must therefore be
/// reusable; it keeps no per-connection state of its own.
///
/// ## Trait bounds explained
///
/// - `Send + Sync + 'static` → each room's session is a spawned task
///   that owns its connector for the room's whole lifetime.
/// - The returned future is `Send` so that task can move between worker
///   threads while a connect is in flight.
/// - `Sink` and `Stream` are associated types, not boxed trait objects,
///   so the send and receive loops are compiled for the concrete
///   transport with no dynamic dispatch per frame.
///
/// ## Errors
///
/// Failures are reported as [`TransportError`]. The session retries
/// those for which [`TransportError::is_retryable`] holds and closes the
/// room on the rest.
pub trait Connector: Send + Sync + 'static {
    /// The write half produced by this connector.
    type Sink: FrameSink;
    /// The read half produced by this connector.
    type Stream: FrameStream;

    /// Opens a connection carrying the request's auth and resume headers.
    fn connect(
        &self,
        request: &ConnectRequest,
    ) -> impl std::future::Future<
        Output = Result<(Self::Sink, Self::Stream), TransportError>,
    > + Send;
}

/// The write half of a connection.
pub trait FrameSink: Send + 'static {
    /// Sends one complete frame.
    fn send(
        &mut self,
        frame: &[u8],
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection from our side.
    fn close(
        &mut self,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// The read half of a connection.
pub trait FrameStream: Send + 'static {
    /// Waits for the next chunk or close notification.
    ///
    /// A stream that ends without a close frame yields
    /// [`TransportError::ConnectionClosed`].
    fn recv(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Incoming, TransportError>> + Send;
}
