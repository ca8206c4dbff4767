//! Integration tests for the buffer pool, callback queue, and cancel
//! signal working together the way a room session uses them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomwire_dispatch::{BufferPool, CallbackQueue, CancelSignal, DispatchError};

// =========================================================================
// BufferPool
// =========================================================================

#[tokio::test]
async fn test_acquire_blocks_until_buffer_released() {
    let pool = BufferPool::new(1, 16);
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|buf| buf.capacity()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let capacity = waiter.await.unwrap().unwrap();
    assert!(capacity >= 16);
}

#[tokio::test]
async fn test_close_wakes_waiters_with_error() {
    let pool = BufferPool::new(1, 16);
    let _held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::task::yield_now().await;
    pool.close();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(DispatchError::PoolClosed)));
}

#[tokio::test]
async fn test_leases_never_exceed_capacity() {
    let pool = BufferPool::new(4, 8);
    let peak = Arc::new(Mutex::new(0usize));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let pool = pool.clone();
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let mut buf = pool.acquire().await.unwrap();
            buf.extend_from_slice(&[7; 40]);
            {
                let mut peak = peak.lock().unwrap();
                *peak = (*peak).max(pool.leased());
            }
            tokio::task::yield_now().await;
            drop(buf);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(*peak.lock().unwrap() <= 4);
    assert_eq!(pool.leased(), 0);
}

#[tokio::test]
async fn test_buffer_held_by_callback_returns_after_drain() {
    let pool = BufferPool::new(1, 8);
    let queue: CallbackQueue = CallbackQueue::new();

    let mut buf = pool.acquire().await.unwrap();
    buf.extend_from_slice(b"frame");
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        queue.enqueue_fn(move || seen.lock().unwrap().extend_from_slice(&buf));
    }

    // Still leased while the callback waits.
    assert!(pool.try_acquire().unwrap().is_none());
    queue.drain().unwrap();
    assert_eq!(*seen.lock().unwrap(), b"frame".to_vec());
    assert!(pool.try_acquire().unwrap().is_some());
}

// =========================================================================
// CallbackQueue
// =========================================================================

#[tokio::test]
async fn test_concurrent_producers_keep_per_producer_order() {
    let queue: CallbackQueue<(usize, usize)> = CallbackQueue::new();

    let mut tasks = Vec::new();
    for producer in 0..4 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..50 {
                queue.enqueue((producer, n));
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut last = [None::<usize>; 4];
    let count = queue
        .drain_with(|(producer, n)| {
            if let Some(prev) = last[producer] {
                assert_eq!(n, prev + 1);
            }
            last[producer] = Some(n);
        })
        .unwrap();
    assert_eq!(count, 200);
}

// =========================================================================
// CancelSignal
// =========================================================================

#[tokio::test]
async fn test_cancelled_wakes_waiting_task() {
    let signal = CancelSignal::new();
    let waiter = {
        let signal = signal.clone();
        tokio::spawn(async move { signal.cancelled().await })
    };
    tokio::task::yield_now().await;
    signal.cancel();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_parent_cancel_wakes_child_waiter() {
    let parent = CancelSignal::new();
    let child = parent.child();
    let waiter = tokio::spawn(async move { child.cancelled().await });
    tokio::task::yield_now().await;
    parent.cancel();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}
