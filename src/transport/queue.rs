//! Unbounded FIFO queues shared between a worker and its owning node
//!
//! Every handle is a cheap clone of the same queue. Producers never block;
//! consumers either peek without waiting (`try_pop`) or park until an item
//! arrives (`pop`).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct QueueInner<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

/// Thread-safe unbounded FIFO queue
pub struct MessageQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> MessageQueue<T> {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Append an item. Never blocks and never fails.
    pub fn push(&self, item: T) {
        self.inner.items.lock().push_back(item);
        self.inner.notify.notify_one();
    }

    /// Remove the oldest item, or `None` if the queue is empty
    pub fn try_pop(&self) -> Option<T> {
        self.inner.items.lock().pop_front()
    }

    /// Wait for the oldest item
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Discard everything currently queued, returning how many items were dropped
    pub fn drain(&self) -> usize {
        let mut items = self.inner.items.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq};

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new();
        for i in 0..5 {
            queue.push(i);
        }

        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_try_pop_empty() {
        let queue: MessageQueue<u32> = MessageQueue::new();
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let producer = MessageQueue::new();
        let consumer = producer.clone();

        producer.push("a");
        assert_eq!(consumer.len(), 1);
        assert_eq!(consumer.try_pop(), Some("a"));
        assert!(producer.is_empty());
    }

    #[test]
    fn test_drain() {
        let queue = MessageQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.drain(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = MessageQueue::new();
        let mut pop = tokio_test::task::spawn(queue.pop());

        assert_pending!(pop.poll());
        queue.push(42);
        assert!(pop.is_woken());
        assert_ready_eq!(pop.poll(), 42);
    }

    #[tokio::test]
    async fn test_pop_across_tasks() {
        let queue = MessageQueue::new();
        let producer = queue.clone();

        let handle = tokio::spawn(async move {
            for i in 0..100 {
                producer.push(i);
            }
        });

        let mut received = Vec::new();
        for _ in 0..100 {
            received.push(queue.pop().await);
        }
        handle.await.unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }
}
