//! Error types for the dispatch layer.

/// Errors from the buffer pool and callback queue.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The pool was closed while waiting for, or before requesting, a
    /// buffer.
    #[error("buffer pool closed")]
    PoolClosed,

    /// `drain` was called while another drain of the same queue was still
    /// running, either from another thread or from inside a callback.
    #[error("callback queue is already being drained")]
    AlreadyDraining,
}
