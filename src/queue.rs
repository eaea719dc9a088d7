//! Joinable work queue shared by the dispatcher, workers, and collector.
//!
//! A multi-producer/multi-consumer FIFO with an explicit acknowledgment per
//! dequeued item and a `join` that resolves only once every enqueued item has
//! been acknowledged. An item that is dequeued but never acknowledged keeps
//! `join` pending forever; that is the contract that forces every consumer
//! path, including failure paths, to acknowledge.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{Semaphore, watch};

/// FIFO queue with per-item acknowledgment and drain tracking.
///
/// Items are handed to exactly one consumer each; concurrent consumers
/// receive disjoint subsets in FIFO order.
pub struct JoinableQueue<T> {
    items: Mutex<VecDeque<T>>,
    // One permit per queued item; consumers park here when the queue is empty.
    ready: Semaphore,
    // Count of items enqueued but not yet acknowledged.
    unfinished: watch::Sender<usize>,
}

impl<T> JoinableQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (unfinished, _) = watch::channel(0);
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            unfinished,
        }
    }

    /// Append an item. Never blocks; capacity is unbounded.
    pub fn enqueue(&self, item: T) {
        self.unfinished.send_modify(|n| *n += 1);
        self.items
            .lock()
            .expect("queue mutex poisoned")
            .push_back(item);
        self.ready.add_permits(1);
    }

    /// Remove and return the oldest item, waiting until one is available.
    pub async fn dequeue(&self) -> T {
        let permit = self
            .ready
            .acquire()
            .await
            .expect("queue semaphore never closed");
        permit.forget();
        self.items
            .lock()
            .expect("queue mutex poisoned")
            .pop_front()
            .expect("permit issued without a queued item")
    }

    /// Mark one previously dequeued item as fully processed.
    ///
    /// Must be called exactly once per dequeued item, on success and failure
    /// paths alike.
    pub fn acknowledge(&self) {
        self.unfinished.send_modify(|n| {
            debug_assert!(*n > 0, "acknowledge without matching dequeue");
            *n = n.saturating_sub(1);
        });
    }

    /// Wait until every enqueued item has been acknowledged.
    ///
    /// Call after all producers have stopped enqueuing.
    pub async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        rx.wait_for(|n| *n == 0)
            .await
            .expect("queue watch never closed");
    }

    /// Number of items enqueued but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }
}

impl<T> Default for JoinableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
