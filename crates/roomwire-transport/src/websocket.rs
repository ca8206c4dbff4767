//! WebSocket connector implementation using `tokio-tungstenite`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::{
    ConnectRequest, Connector, FrameSink, FrameStream, Incoming,
    TransportError,
};

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// A [`Connector`] that dials `ws://` and `wss://` room endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Sink = WebSocketSink;
    type Stream = WebSocketStream;

    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Self::Sink, Self::Stream), TransportError> {
        let mut http = request
            .url
            .as_str()
            .into_client_request()
            .map_err(classify)?;
        for (name, value) in request.headers() {
            let value = HeaderValue::from_str(&value).map_err(|e| {
                TransportError::InvalidRequest(format!("{name}: {e}"))
            })?;
            http.headers_mut()
                .insert(HeaderName::from_static(name), value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(http)
            .await
            .map_err(classify)?;
        tracing::debug!(
            url = %request.url,
            user = %request.user_id,
            last_event_seq = request.last_event_seq,
            "WebSocket connected"
        );

        let (sink, stream) = ws.split();
        Ok((
            WebSocketSink { inner: sink },
            WebSocketStream { inner: stream },
        ))
    }
}

/// Sorts opening-handshake failures into fatal and retryable.
fn classify(err: WsError) -> TransportError {
    match err {
        WsError::Url(e) => TransportError::Incompatible(e.to_string()),
        WsError::Protocol(e) => TransportError::Incompatible(e.to_string()),
        WsError::Http(response) if response.status().is_client_error() => {
            TransportError::Incompatible(format!(
                "http {} instead of upgrade",
                response.status()
            ))
        }
        WsError::HttpFormat(e) => TransportError::InvalidRequest(e.to_string()),
        WsError::Io(e) => TransportError::ConnectFailed(e),
        other => TransportError::ConnectFailed(std::io::Error::other(other)),
    }
}

/// The write half of a WebSocket room connection.
pub struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.inner
            .send(Message::Binary(frame.to_vec().into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

/// The read half of a WebSocket room connection.
///
/// WebSocket delivers whole messages, so every frame arrives as a single
/// chunk with `last` set.
pub struct WebSocketStream {
    inner: SplitStream<WsStream>,
}

impl FrameStream for WebSocketStream {
    async fn recv(&mut self) -> Result<Incoming, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Incoming::Chunk {
                        data: data.into(),
                        last: true,
                    });
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Incoming::Chunk {
                        data: text.as_bytes().to_vec(),
                        last: true,
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => {
                            (u16::from(frame.code), frame.reason.to_string())
                        }
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    return Ok(Incoming::Close { code, reason });
                }
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
                None => {
                    return Err(TransportError::ConnectionClosed(
                        "stream ended without close frame".into(),
                    ));
                }
            }
        }
    }
}
