//! Bounded FIFO queue with drop-oldest-when-full semantics.
//!
//! `tokio::sync::mpsc` can't drop an arbitrary already-queued item when
//! a new one arrives — only the sender side can be made to block or
//! fail. The audit pipeline needs the opposite: never block the caller,
//! never fail the caller, and lose the oldest buffered event instead.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A single-consumer, multi-producer queue that drops its oldest entry
/// when full instead of blocking or erroring the producer.
pub struct DropOldestQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Push an item, dropping the oldest buffered item if the queue is
    /// already at capacity. Never blocks.
    pub fn push(&self, item: T) {
        let mut guard = self.inner.lock().expect("audit queue mutex poisoned");
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        guard.push_back(item);
        drop(guard);
        self.notify.notify_one();
    }

    /// Pop the oldest item, if any, without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.inner
            .lock()
            .expect("audit queue mutex poisoned")
            .pop_front()
    }

    /// Wait until an item is available, then pop it.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("audit queue mutex poisoned").len()
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of items dropped over this queue's lifetime.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_capacity_drops_oldest() {
        let q = DropOldestQueue::new(2);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.dropped_count(), 1);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let q = DropOldestQueue::new(10);
        for i in 0..5 {
            q.push(i);
        }
        let drained: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn pop_waits_for_an_item() {
        let q = std::sync::Arc::new(DropOldestQueue::new(4));
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::task::yield_now().await;
        q.push("hello");
        let popped = handle.await.unwrap();
        assert_eq!(popped, "hello");
    }
}
