//! Hand-off machinery between Roomwire's network tasks and the
//! application thread.
//!
//! - [`BufferPool`] bounds how many inbound frames can be in flight.
//! - [`CallbackQueue`] carries deferred work to the thread that drains it.
//! - [`CancelSignal`] stops a connection's loops cooperatively.
//!
//! # Flow
//!
//! ```text
//! receive loop ── acquire ──▶ PooledBuf ── enqueue ──▶ CallbackQueue
//!                                                          │
//! application tick ◀────────────── drain ──────────────────┘
//!                 (PooledBuf dropped here, lease returned)
//! ```

mod cancel;
mod error;
mod pool;
mod queue;

pub use cancel::CancelSignal;
pub use error::DispatchError;
pub use pool::{BufferPool, PooledBuf};
pub use queue::{Callback, CallbackQueue};
