//! Bounded pool of reusable frame buffers.
//!
//! The pool holds `capacity` buffers. [`BufferPool::acquire`] waits until
//! one is free, which is how the receive loop is throttled when the
//! application falls behind draining callbacks: every in-flight frame
//! holds a lease until its callback has run. A [`PooledBuf`] goes back to
//! the pool when dropped, keeping whatever capacity it grew to.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::DispatchError;

/// A fixed-capacity pool of byte buffers. Cloning shares the pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    permits: Arc<Semaphore>,
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

impl BufferPool {
    /// Creates `capacity` buffers of `initial_size` bytes each.
    pub fn new(capacity: usize, initial_size: usize) -> Self {
        let free = (0..capacity)
            .map(|_| Vec::with_capacity(initial_size))
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(capacity)),
                free: Mutex::new(free),
                capacity,
            }),
        }
    }

    /// Waits for a free buffer.
    ///
    /// # Errors
    /// [`DispatchError::PoolClosed`] once [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<PooledBuf, DispatchError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::PoolClosed)?;
        Ok(self.lease(permit))
    }

    /// Takes a free buffer if one is available right now.
    pub fn try_acquire(&self) -> Result<Option<PooledBuf>, DispatchError> {
        match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => Ok(Some(self.lease(permit))),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(DispatchError::PoolClosed),
        }
    }

    /// Wakes every waiter with [`DispatchError::PoolClosed`]. Buffers
    /// already leased stay valid.
    pub fn close(&self) {
        self.inner.permits.close();
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Buffers not currently leased.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Buffers currently leased.
    pub fn leased(&self) -> usize {
        self.inner.capacity - self.available()
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> PooledBuf {
        // A permit guarantees a free buffer; allocate only if a previous
        // holder panicked mid-return.
        let buf = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        PooledBuf {
            buf,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        }
    }
}

/// A buffer leased from a [`BufferPool`].
///
/// Dereferences to the bytes written so far.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
    // Declared last: released only after `Drop` returned the buffer.
    _permit: OwnedSemaphorePermit,
}

impl PooledBuf {
    /// Appends `data`, doubling the capacity as often as needed.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        let needed = self.buf.len() + data.len();
        let mut cap = self.buf.capacity().max(1);
        if needed > cap {
            while cap < needed {
                cap *= 2;
            }
            self.buf.reserve_exact(cap - self.buf.len());
        }
        self.buf.extend_from_slice(data);
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        self.pool
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_doubles_capacity() {
        let pool = BufferPool::new(1, 4);
        let mut buf = pool.try_acquire().unwrap().unwrap();
        buf.extend_from_slice(&[0; 4]);
        assert_eq!(buf.capacity(), 4);

        buf.extend_from_slice(&[0; 5]);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn test_returned_buffer_keeps_grown_capacity_and_is_empty() {
        let pool = BufferPool::new(1, 2);
        let mut buf = pool.try_acquire().unwrap().unwrap();
        buf.extend_from_slice(&[1; 10]);
        drop(buf);

        let buf = pool.try_acquire().unwrap().unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 10);
    }

    #[test]
    fn test_try_acquire_exhausted_returns_none() {
        let pool = BufferPool::new(2, 8);
        let _a = pool.try_acquire().unwrap().unwrap();
        let _b = pool.try_acquire().unwrap().unwrap();
        assert!(pool.try_acquire().unwrap().is_none());
        assert_eq!(pool.leased(), 2);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_zero_initial_size_still_grows() {
        let pool = BufferPool::new(1, 0);
        let mut buf = pool.try_acquire().unwrap().unwrap();
        buf.extend_from_slice(b"abc");
        assert_eq!(&*buf, b"abc");
    }
}
