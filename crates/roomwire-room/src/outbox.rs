//! Retained outgoing messages.
//!
//! Messages are encoded once, at post time, with the next sequence number
//! (starting at 1). They stay in the outbox until the server acknowledges
//! them through a PeerReady event, so that after a reconnect the sender
//! can resume exactly where the server stopped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use roomwire_protocol::{MAX_MSG_SEQ, Msg, ProtocolError, TypeRegistry};

use crate::RoomError;

struct Entry {
    seq: u32,
    frame: Arc<[u8]>,
}

pub(crate) struct Outbox {
    entries: VecDeque<Entry>,
    capacity: usize,
    next_seq: u32,
    /// Highest sequence written on the current connection.
    sent_upto: u32,
    closed: bool,
}

impl Outbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_seq: 1,
            sent_upto: 0,
            closed: false,
        }
    }

    /// Encodes `msg` with the next sequence number and queues it.
    ///
    /// At capacity, the oldest entry is dropped if it has already been
    /// sent; otherwise posting fails.
    pub(crate) fn post(
        &mut self,
        msg: &Msg,
        registry: &TypeRegistry,
    ) -> Result<u32, RoomError> {
        if self.closed {
            return Err(RoomError::Closed);
        }
        let seq = self.next_seq;
        if seq > MAX_MSG_SEQ {
            return Err(ProtocolError::SequenceOverflow(seq).into());
        }
        if self.entries.len() >= self.capacity {
            match self.entries.front() {
                Some(oldest) if oldest.seq <= self.sent_upto => {
                    self.entries.pop_front();
                }
                _ => return Err(RoomError::OutboxFull(self.entries.len())),
            }
        }

        let frame = msg.encode(seq, registry)?;
        self.entries.push_back(Entry {
            seq,
            frame: frame.into(),
        });
        self.next_seq += 1;
        Ok(seq)
    }

    /// The server holds everything up to `last_msg_seq`; resending starts
    /// right after it.
    pub(crate) fn ack(&mut self, last_msg_seq: u32) {
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.seq <= last_msg_seq)
        {
            self.entries.pop_front();
        }
        self.sent_upto = last_msg_seq;
    }

    /// The frame with sequence number `cursor`, if it was posted.
    ///
    /// # Errors
    /// [`RoomError::ResumeTooOld`] if `cursor` was already dropped.
    pub(crate) fn frame_at(
        &self,
        cursor: u32,
    ) -> Result<Option<Arc<[u8]>>, RoomError> {
        let oldest = self
            .entries
            .front()
            .map_or(self.next_seq, |entry| entry.seq);
        if cursor < oldest {
            return Err(RoomError::ResumeTooOld { cursor, oldest });
        }
        let index = (cursor - oldest) as usize;
        Ok(self.entries.get(index).map(|entry| Arc::clone(&entry.frame)))
    }

    pub(crate) fn mark_sent(&mut self, seq: u32) {
        self.sent_upto = self.sent_upto.max(seq);
    }

    /// Rejects further posts.
    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Locks an outbox, ignoring poisoning (the data stays consistent
/// between method calls).
pub(crate) fn lock(outbox: &Mutex<Outbox>) -> MutexGuard<'_, Outbox> {
    outbox.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(outbox: &mut Outbox) -> Result<u32, RoomError> {
        outbox.post(&Msg::Leave, &TypeRegistry::new())
    }

    #[test]
    fn test_post_assigns_sequence_from_one() {
        let mut outbox = Outbox::new(8);
        assert_eq!(post(&mut outbox).unwrap(), 1);
        assert_eq!(post(&mut outbox).unwrap(), 2);
        let frame = outbox.frame_at(2).unwrap().unwrap();
        assert_eq!(&frame[..], &[30, 0, 0, 2]);
        assert!(outbox.frame_at(3).unwrap().is_none());
    }

    #[test]
    fn test_ack_prunes_and_resumes_after_acked() {
        let mut outbox = Outbox::new(8);
        for _ in 0..7 {
            post(&mut outbox).unwrap();
        }
        outbox.ack(5);
        assert_eq!(outbox.len(), 2);
        assert_eq!(&outbox.frame_at(6).unwrap().unwrap()[..], &[30, 0, 0, 6]);
        assert!(matches!(
            outbox.frame_at(5),
            Err(RoomError::ResumeTooOld { cursor: 5, oldest: 6 })
        ));
    }

    #[test]
    fn test_full_outbox_evicts_oldest_sent() {
        let mut outbox = Outbox::new(2);
        post(&mut outbox).unwrap();
        post(&mut outbox).unwrap();
        outbox.mark_sent(1);
        assert_eq!(post(&mut outbox).unwrap(), 3);
        assert!(outbox.frame_at(1).is_err());
        assert!(outbox.frame_at(2).unwrap().is_some());
    }

    #[test]
    fn test_full_outbox_of_unsent_rejects_post() {
        let mut outbox = Outbox::new(2);
        post(&mut outbox).unwrap();
        post(&mut outbox).unwrap();
        assert!(matches!(post(&mut outbox), Err(RoomError::OutboxFull(2))));
        // Nothing was consumed.
        assert_eq!(post(&mut outbox).is_err(), true);
        outbox.mark_sent(2);
        assert_eq!(post(&mut outbox).unwrap(), 3);
    }

    #[test]
    fn test_ack_resets_sent_mark_for_resend() {
        let mut outbox = Outbox::new(2);
        post(&mut outbox).unwrap();
        post(&mut outbox).unwrap();
        outbox.mark_sent(2);
        // Reconnected: the server only has message 1.
        outbox.ack(1);
        post(&mut outbox).unwrap();
        // Message 2 must not be evicted before it is resent.
        assert!(matches!(post(&mut outbox), Err(RoomError::OutboxFull(2))));
    }

    #[test]
    fn test_closed_outbox_rejects_post() {
        let mut outbox = Outbox::new(2);
        outbox.close();
        assert!(matches!(post(&mut outbox), Err(RoomError::Closed)));
    }
}
