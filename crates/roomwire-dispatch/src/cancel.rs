//! Cooperative cancellation.
//!
//! A [`CancelSignal`] is raised once and observed by every clone. A
//! [`child`](CancelSignal::child) is cancelled together with its parent
//! but can also be cancelled on its own, which gives one signal per
//! connection attempt under one signal per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

/// A clonable, one-shot cancellation flag.
#[derive(Clone, Default)]
pub struct CancelSignal {
    node: Arc<Node>,
}

#[derive(Default)]
struct Node {
    cancelled: AtomicBool,
    notify: Notify,
    // Pruned of cancelled entries whenever a child is added.
    children: Mutex<Vec<Arc<Node>>>,
}

impl Node {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children {
            child.cancel();
        }
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal for this clone set and all children.
    pub fn cancel(&self) {
        self.node.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.cancelled.load(Ordering::SeqCst)
    }

    /// A new signal that is also raised when this one is.
    pub fn child(&self) -> Self {
        let child = Arc::new(Node::default());
        let mut children = self
            .node
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            child.cancelled.store(true, Ordering::SeqCst);
        } else {
            children.retain(|c| !c.cancelled.load(Ordering::SeqCst));
            children.push(Arc::clone(&child));
        }
        Self { node: child }
    }

    /// Completes once the signal is raised.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.node.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_to_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent_running() {
        let parent = CancelSignal::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_parent_cancel_reaches_grandchildren() {
        let parent = CancelSignal::new();
        let grandchild = parent.child().child();
        parent.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancelSignal::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_raised() {
        let signal = CancelSignal::new();
        signal.cancel();
        signal.cancelled().await;
    }
}
