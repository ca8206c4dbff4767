//! Deferred callback queue.
//!
//! Background loops [`enqueue`](CallbackQueue::enqueue) work; the
//! application runs it by calling [`drain`](CallbackQueue::drain) from one
//! place, typically once per frame or game tick. A drain runs a snapshot
//! of the queue: anything enqueued while it runs, including by the
//! callbacks themselves, waits for the next drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::DispatchError;

/// A boxed zero-argument callback.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// An ordered multi-producer queue drained by one consumer at a time.
/// Cloning shares the queue.
pub struct CallbackQueue<T = Callback> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    items: Mutex<VecDeque<T>>,
    draining: AtomicBool,
}

impl<T> Clone for CallbackQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CallbackQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CallbackQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Appends `item`. Safe from any thread.
    pub fn enqueue(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Hands every queued item to `apply`, in enqueue order, on the
    /// calling thread. Returns how many were applied.
    ///
    /// # Errors
    /// [`DispatchError::AlreadyDraining`] if a drain of this queue is
    /// already in progress.
    pub fn drain_with(
        &self,
        mut apply: impl FnMut(T),
    ) -> Result<usize, DispatchError> {
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyDraining);
        }
        let _guard = DrainGuard(&self.inner.draining);

        let batch = std::mem::take(&mut *self.lock());
        let count = batch.len();
        for item in batch {
            apply(item);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards everything queued.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CallbackQueue<Callback> {
    /// Boxes and enqueues a closure.
    pub fn enqueue_fn(&self, f: impl FnOnce() + Send + 'static) {
        self.enqueue(Box::new(f));
    }

    /// Runs every queued callback.
    pub fn drain(&self) -> Result<usize, DispatchError> {
        self.drain_with(|callback| callback())
    }
}

/// Clears the draining flag even if a callback panics.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_drain_runs_in_enqueue_order() {
        let queue: CallbackQueue = CallbackQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            queue.enqueue_fn(move || seen.lock().unwrap().push(name));
        }
        assert_eq!(queue.drain().unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_during_drain_waits_for_next_drain() {
        let queue: CallbackQueue = CallbackQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (q, r) = (queue.clone(), Arc::clone(&runs));
        queue.enqueue_fn(move || {
            r.fetch_add(1, Ordering::SeqCst);
            let r = Arc::clone(&r);
            q.enqueue_fn(move || {
                r.fetch_add(10, Ordering::SeqCst);
            });
        });

        assert_eq!(queue.drain().unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain().unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_drain_from_inside_callback_is_rejected() {
        let queue: CallbackQueue = CallbackQueue::new();
        let nested = Arc::new(Mutex::new(None));
        let (q, n) = (queue.clone(), Arc::clone(&nested));
        queue.enqueue_fn(move || {
            *n.lock().unwrap() = Some(q.drain().is_err());
        });
        queue.drain().unwrap();
        assert_eq!(*nested.lock().unwrap(), Some(true));
        // The flag is cleared afterwards.
        assert_eq!(queue.drain().unwrap(), 0);
    }

    #[test]
    fn test_drain_with_typed_items() {
        let queue: CallbackQueue<u32> = CallbackQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        let mut sum = 0;
        queue.drain_with(|n| sum += n).unwrap();
        assert_eq!(sum, 3);
    }
}
