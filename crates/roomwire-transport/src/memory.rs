//! In-process transport with a scripted server side.
//!
//! [`pair`] returns a [`MemoryConnector`] for the client and a
//! [`MemoryServer`] that hands out one [`MemoryPeer`] per successful
//! connect. A test drives the peer directly: it inspects the resume
//! headers, pushes event frames (whole or split into chunks), closes with
//! a chosen code, or simply drops the peer to simulate a broken link.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{
    ConnectRequest, Connector, FrameSink, FrameStream, Incoming,
    TransportError,
};

/// Creates a connected connector/server pair.
pub fn pair() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        accept: accept_tx,
        failures: Arc::new(Mutex::new(VecDeque::new())),
        attempts: Arc::new(AtomicUsize::new(0)),
    };
    (connector, MemoryServer { accept: accept_rx })
}

/// What the client wrote to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// One complete frame.
    Data(Vec<u8>),
    /// The client closed its side.
    Close,
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Client half of the in-memory transport.
#[derive(Clone)]
pub struct MemoryConnector {
    accept: mpsc::UnboundedSender<MemoryPeer>,
    failures: Arc<Mutex<VecDeque<TransportError>>>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Makes the next connect attempt fail with `err`. Failures queue up
    /// and are consumed in order.
    pub fn fail_next(&self, err: TransportError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// Number of connect attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<TransportError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl Connector for MemoryConnector {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Self::Sink, Self::Stream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            request: request.clone(),
            outbound: to_client_tx,
            inbound: to_server_rx,
        };
        self.accept.send(peer).map_err(|_| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory server dropped",
            ))
        })?;

        tracing::trace!(user = %request.user_id, "memory transport connected");
        Ok((
            MemorySink { tx: to_server_tx },
            MemoryStream { rx: to_client_rx },
        ))
    }
}

/// Write half handed to the client.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<ClientFrame>,
}

impl FrameSink for MemorySink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.tx.send(ClientFrame::Data(frame.to_vec())).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory peer dropped",
            ))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The peer may already be gone; closing is best effort.
        let _ = self.tx.send(ClientFrame::Close);
        Ok(())
    }
}

/// Read half handed to the client.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Result<Incoming, TransportError>>,
}

impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Incoming, TransportError> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(TransportError::ConnectionClosed(
                "memory peer dropped".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Accepts in-memory connections.
pub struct MemoryServer {
    accept: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the next client connection.
    ///
    /// Returns `None` once every [`MemoryConnector`] clone is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept.recv().await
    }
}

/// Server end of one in-memory connection.
pub struct MemoryPeer {
    request: ConnectRequest,
    outbound: mpsc::UnboundedSender<Result<Incoming, TransportError>>,
    inbound: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MemoryPeer {
    /// The request the client connected with.
    pub fn request(&self) -> &ConnectRequest {
        &self.request
    }

    /// Delivers one complete frame.
    pub fn send_frame(
        &self,
        frame: impl Into<Vec<u8>>,
    ) -> Result<(), TransportError> {
        self.push(Ok(Incoming::Chunk {
            data: frame.into(),
            last: true,
        }))
    }

    /// Delivers one frame split into chunks of at most `chunk_size` bytes.
    pub fn send_chunked(
        &self,
        frame: &[u8],
        chunk_size: usize,
    ) -> Result<(), TransportError> {
        let chunks: Vec<&[u8]> = frame.chunks(chunk_size.max(1)).collect();
        let count = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.push(Ok(Incoming::Chunk {
                data: chunk.to_vec(),
                last: i + 1 == count,
            }))?;
        }
        Ok(())
    }

    /// Sends a close frame.
    pub fn close(
        &self,
        code: u16,
        reason: &str,
    ) -> Result<(), TransportError> {
        self.push(Ok(Incoming::Close {
            code,
            reason: reason.to_string(),
        }))
    }

    /// Makes the client's next read fail with `err`.
    pub fn fail(&self, err: TransportError) -> Result<(), TransportError> {
        self.push(Err(err))
    }

    /// Waits for the next thing the client wrote.
    ///
    /// Returns `None` once the client dropped its sink.
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.inbound.recv().await
    }

    fn push(
        &self,
        item: Result<Incoming, TransportError>,
    ) -> Result<(), TransportError> {
        self.outbound.send(item).map_err(|_| {
            TransportError::ConnectionClosed("client stream dropped".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConnectRequest {
        ConnectRequest {
            url: "memory://room/1".into(),
            app_id: "app".into(),
            user_id: "alice".into(),
            nonce: "n".into(),
            hash: "h".into(),
            last_event_seq: 0,
        }
    }

    #[tokio::test]
    async fn test_connect_delivers_peer_with_request() {
        let (connector, mut server) = pair();
        let (_sink, _stream) = connector.connect(&request()).await.unwrap();
        let peer = server.accept().await.unwrap();
        assert_eq!(peer.request().user_id, "alice");
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_consumed_in_order() {
        let (connector, _server) = pair();
        connector.fail_next(TransportError::Incompatible("first".into()));
        connector.fail_next(TransportError::ConnectionClosed("second".into()));

        let first = connector.connect(&request()).await.err().unwrap();
        assert!(matches!(first, TransportError::Incompatible(_)));
        let second = connector.connect(&request()).await.err().unwrap();
        assert!(matches!(second, TransportError::ConnectionClosed(_)));
        assert!(connector.connect(&request()).await.is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn test_send_chunked_marks_only_last_chunk() {
        let (connector, mut server) = pair();
        let (_sink, mut stream) = connector.connect(&request()).await.unwrap();
        let peer = server.accept().await.unwrap();

        peer.send_chunked(&[1, 2, 3, 4, 5], 2).unwrap();
        let mut got = Vec::new();
        loop {
            match stream.recv().await.unwrap() {
                Incoming::Chunk { data, last } => {
                    got.extend(data);
                    if last {
                        break;
                    }
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_dropped_peer_reads_as_connection_closed() {
        let (connector, mut server) = pair();
        let (_sink, mut stream) = connector.connect(&request()).await.unwrap();
        drop(server.accept().await.unwrap());

        let err = stream.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_frames_reach_peer() {
        let (connector, mut server) = pair();
        let (mut sink, _stream) = connector.connect(&request()).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        sink.send(&[9, 9]).await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(peer.recv().await, Some(ClientFrame::Data(vec![9, 9])));
        assert_eq!(peer.recv().await, Some(ClientFrame::Close));
    }
}
