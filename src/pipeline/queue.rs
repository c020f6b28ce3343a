//! Ordered FIFO hand-off between two pipeline stages

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Thread-safe blocking FIFO
///
/// The queue never carries an end-of-stream marker; consumers learn that
/// no more items are coming from the completion signals and counters.
#[derive(Debug)]
pub struct SegmentQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for SegmentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SegmentQueue<T> {
    /// Create an empty, unbounded queue
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Append an item at the back
    pub fn push(&self, item: T) {
        // The queue owns its receiver, so the channel cannot be disconnected
        if self.tx.send(item).is_err() {
            tracing::error!("segment queue disconnected");
        }
    }

    /// Take the front item, waiting at most `wait`
    pub fn pop_timeout(&self, wait: Duration) -> Option<T> {
        match self.rx.recv_timeout(wait) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take the front item if one is ready
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of queued items
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop every queued item, returning how many were discarded
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = SegmentQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_timeout_on_empty() {
        let queue: SegmentQueue<String> = SegmentQueue::new();
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_cross_thread_hand_off() {
        let queue = Arc::new(SegmentQueue::new());
        let producer = Arc::clone(&queue);

        let handle = std::thread::spawn(move || {
            for i in 0..50 {
                producer.push(i);
            }
        });

        let mut received = Vec::new();
        while received.len() < 50 {
            if let Some(item) = queue.pop_timeout(Duration::from_secs(1)) {
                received.push(item);
            }
        }
        handle.join().unwrap();

        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain() {
        let queue = SegmentQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
    }
}
