//! The background half of a room: connect, receive, send, reconnect.
//!
//! One [`Session`] task runs per room. Each connection attempt runs a
//! receive loop and a send loop side by side under its own cancel
//! signal; whichever ends first ends the attempt, and the session decides
//! whether to retry or close.
//!
//! ```text
//!          ┌──────────── attempt ─────────────┐
//! connect ─┤ receive: frames → Event → queue  ├─ exit / error
//!          │ send:    wait PeerReady, drain   │
//!          └──────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use roomwire_dispatch::{BufferPool, CallbackQueue, CancelSignal};
use roomwire_protocol::{Event, RoomId, TypeRegistry};
use roomwire_transport::{
    ConnectRequest, Connector, FrameSink, FrameStream, Incoming, is_terminal_close,
};
use tokio::sync::{Notify, oneshot, watch};
use tokio::time::Instant;

use crate::events::Effect;
use crate::outbox::{self, Outbox};
use crate::{GapPolicy, RoomConfig, RoomError, RoomState};

/// How a connection ended without error.
enum Exit {
    /// The server closed the room.
    Closed(String),
    /// The application asked to disconnect.
    Shutdown,
}

pub(crate) struct Session<C: Connector> {
    pub(crate) connector: C,
    pub(crate) request: ConnectRequest,
    pub(crate) room_id: RoomId,
    pub(crate) config: RoomConfig,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) queue: CallbackQueue<Effect>,
    pub(crate) pool: BufferPool,
    pub(crate) outbox: Arc<Mutex<Outbox>>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) state: watch::Sender<RoomState>,
    pub(crate) shutdown: CancelSignal,
}

impl<C: Connector> Session<C> {
    /// Runs until the room closes. Always ends by queueing
    /// [`Effect::Closed`].
    pub(crate) async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, "room session started");

        let mut last_event_seq = 0u32;
        let mut attempts = 0u32;
        loop {
            self.set_state(RoomState::Connecting);
            let retry_at = Instant::now() + self.config.retry_interval;
            let attempt = self.shutdown.child();
            let result = self.run_attempt(&attempt, &mut last_event_seq).await;
            attempt.cancel();

            let err = match result {
                Ok(Exit::Closed(reason)) => return self.finish(reason),
                Ok(Exit::Shutdown) => return self.finish("disconnected".into()),
                Err(err) => err,
            };

            if self.is_fatal(&err) {
                tracing::error!(room_id = %self.room_id, error = %err, "room session failed");
                let reason = err.to_string();
                self.queue.enqueue(Effect::Error(err));
                return self.finish(reason);
            }

            // Cumulative over the room's lifetime, even across connections
            // that reached Running.
            attempts += 1;
            tracing::warn!(
                room_id = %self.room_id,
                attempt = attempts,
                last_event_seq,
                error = %err,
                "connection lost"
            );
            let reason = err.to_string();
            self.queue.enqueue(Effect::Error(err));
            if attempts > self.config.max_reconnection {
                return self.finish(format!("max reconnection: {reason}"));
            }

            self.set_state(RoomState::Reconnecting);
            tokio::select! {
                _ = tokio::time::sleep_until(retry_at) => {}
                _ = self.shutdown.cancelled() => {
                    return self.finish("disconnected".into());
                }
            }
        }
    }

    async fn run_attempt(
        &mut self,
        attempt: &CancelSignal,
        last_event_seq: &mut u32,
    ) -> Result<Exit, RoomError> {
        self.request.last_event_seq = *last_event_seq;
        let (mut sink, mut stream) = tokio::select! {
            conn = self.connector.connect(&self.request) => conn?,
            _ = attempt.cancelled() => return Ok(Exit::Shutdown),
        };
        self.set_state(RoomState::Receiving);
        tracing::info!(
            room_id = %self.room_id,
            last_event_seq = *last_event_seq,
            "connected"
        );

        let (ready_tx, ready_rx) = oneshot::channel();
        let exit = tokio::select! {
            result = self.receive(&mut stream, last_event_seq, ready_tx) => result,
            result = self.send(&mut sink, ready_rx) => result.map(|never| match never {}),
            _ = attempt.cancelled() => Ok(Exit::Shutdown),
        };

        if exit.is_ok() {
            if let Err(err) = sink.close().await {
                tracing::debug!(room_id = %self.room_id, error = %err, "close failed");
            }
        }
        exit
    }

    /// Reads frames into pooled buffers and queues the decoded events.
    async fn receive(
        &self,
        stream: &mut C::Stream,
        last_event_seq: &mut u32,
        ready: oneshot::Sender<u32>,
    ) -> Result<Exit, RoomError> {
        let mut ready = Some(ready);
        loop {
            let mut frame = self.pool.acquire().await?;
            loop {
                match stream.recv().await? {
                    Incoming::Chunk { data, last } => {
                        frame.extend_from_slice(&data);
                        if last {
                            break;
                        }
                    }
                    Incoming::Close { code, reason } if is_terminal_close(code) => {
                        tracing::info!(room_id = %self.room_id, code, %reason, "closed by server");
                        return Ok(Exit::Closed(reason));
                    }
                    Incoming::Close { code, reason } => {
                        return Err(RoomError::ClosedAbnormally { code, reason });
                    }
                }
            }

            let event = Event::parse(&frame, &self.registry)?;
            if let Some(seq) = event.seq() {
                let expected = last_event_seq.wrapping_add(1);
                if seq != expected {
                    return Err(RoomError::SequenceMismatch { expected, got: seq });
                }
                *last_event_seq = seq;
            }

            match event {
                Event::PeerReady { last_msg_seq } => {
                    outbox::lock(&self.outbox).ack(last_msg_seq);
                    match ready.take() {
                        Some(tx) => {
                            let _ = tx.send(last_msg_seq + 1);
                            self.set_state(RoomState::Running);
                            tracing::debug!(room_id = %self.room_id, last_msg_seq, "peer ready");
                        }
                        None => tracing::warn!(room_id = %self.room_id, "duplicate PeerReady ignored"),
                    }
                }
                event => {
                    tracing::trace!(
                        room_id = %self.room_id,
                        seq = ?event.seq(),
                        ev_type = ?event.ev_type(),
                        "event received"
                    );
                    self.queue.enqueue(Effect::Event { event, frame });
                }
            }
        }
    }

    /// Once the server is ready, writes every retained message from its
    /// resume cursor on, then follows new posts.
    async fn send(
        &self,
        sink: &mut C::Sink,
        ready: oneshot::Receiver<u32>,
    ) -> Result<Infallible, RoomError> {
        let Ok(mut cursor) = ready.await else {
            // The receive loop is gone and ends this attempt.
            return std::future::pending().await;
        };
        loop {
            let next = outbox::lock(&self.outbox).frame_at(cursor)?;
            match next {
                Some(frame) => {
                    sink.send(&frame).await?;
                    outbox::lock(&self.outbox).mark_sent(cursor);
                    tracing::trace!(room_id = %self.room_id, msg_seq = cursor, "message sent");
                    cursor += 1;
                }
                None => self.wake.notified().await,
            }
        }
    }

    fn is_fatal(&self, err: &RoomError) -> bool {
        match err {
            RoomError::SequenceMismatch { .. } => self.config.gap_policy == GapPolicy::Fatal,
            other => other.is_fatal(),
        }
    }

    fn set_state(&self, target: RoomState) {
        self.state.send_if_modified(|state| {
            if !state.can_transition_to(target) {
                return false;
            }
            tracing::debug!(room_id = %self.room_id, from = %state, to = %target, "state changed");
            *state = target;
            true
        });
    }

    fn finish(&self, reason: String) {
        outbox::lock(&self.outbox).close();
        self.set_state(RoomState::Closed);
        tracing::info!(room_id = %self.room_id, %reason, "room session closed");
        self.queue.enqueue(Effect::Closed(reason));
    }
}
