//! Bounded multi-producer/multi-consumer hand-off queue
//!
//! Built on a bounded `tokio::sync::mpsc` channel. Producers get cloned
//! [`QueueSender`]s; consumers share the single receiver through a mutex, so
//! each item is delivered to exactly one consumer. The queue counts as closed
//! once [`HandoffQueue::close`] has dropped the orchestrator's sender and
//! every producer handle is gone; after that, buffered items are still
//! delivered and then [`QueueReceiver::pop`] returns `None`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Largest capacity the underlying channel accepts
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Error returned when pushing into a queue whose receiving side is gone
#[derive(Debug, thiserror::Error)]
#[error("hand-off queue is closed")]
pub struct QueueClosed;

/// Owner of the hand-off queue; only the owner may close it
pub struct HandoffQueue<T> {
    sender: Option<QueueSender<T>>,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    capacity: usize,
}

impl<T: Send + 'static> HandoffQueue<T> {
    /// Create a queue holding at most `capacity` items, clamped to
    /// `1..=MAX_QUEUE_CAPACITY`
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            sender: Some(QueueSender {
                inner: tx,
                live: Arc::new(AtomicUsize::new(1)),
            }),
            receiver: Arc::new(Mutex::new(rx)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Handle for one producer, or `None` once the queue has been closed
    pub fn sender(&self) -> Option<QueueSender<T>> {
        self.sender.clone()
    }

    /// Handle for one consumer
    pub fn receiver(&self) -> QueueReceiver<T> {
        QueueReceiver {
            inner: self.receiver.clone(),
        }
    }

    /// Drop the owner's sender so consumers see the end of the stream
    ///
    /// Returns how many producer handles are still alive. Closing is only
    /// correct once that number is zero: any remaining handle keeps the
    /// stream open and could still push.
    pub fn close(&mut self) -> usize {
        match self.sender.take() {
            Some(sender) => {
                let live = sender.live.clone();
                drop(sender);
                live.load(Ordering::SeqCst)
            }
            None => 0,
        }
    }

    /// Discard everything still buffered, returning the number of items
    ///
    /// Used after consumers have stopped to account for records nobody
    /// processed.
    pub async fn drain_remaining(&self) -> usize {
        let mut rx = self.receiver.lock().await;
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// Producer side of the hand-off queue
pub struct QueueSender<T> {
    inner: mpsc::Sender<T>,
    live: Arc<AtomicUsize>,
}

impl<T> QueueSender<T> {
    /// Push one item, waiting while the queue is full
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.inner.send(item).await.map_err(|_| QueueClosed)
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        self.live.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: self.inner.clone(),
            live: self.live.clone(),
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Consumer side of the hand-off queue
pub struct QueueReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> QueueReceiver<T> {
    /// Take the next item, or `None` once the queue is closed and empty
    pub async fn pop(&self) -> Option<T> {
        let mut rx = self.inner.lock().await;
        rx.recv().await
    }
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
