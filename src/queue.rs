// Bounded FIFO hand-off between sampler and aggregator. Single producer,
// single consumer; the only synchronization point in the pipeline.

use crate::models::Snapshot;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Outcome of a push. A full queue is an ordinary condition, not an error:
/// after the bounded wait the oldest snapshot yields to the newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    DroppedOldest,
}

pub struct IngestQueue {
    inner: Mutex<VecDeque<Snapshot>>,
    capacity: usize,
    push_timeout: Duration,
    /// Signalled when an item is queued (wakes the consumer).
    items: Notify,
    /// Signalled when an item is popped (wakes a waiting producer).
    space: Notify,
    dropped_oldest: AtomicU64,
}

impl IngestQueue {
    pub fn new(capacity: usize, push_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            push_timeout,
            items: Notify::new(),
            space: Notify::new(),
            dropped_oldest: AtomicU64::new(0),
        }
    }

    /// Enqueue in arrival order. Waits up to the push timeout for space;
    /// when still full, drops the oldest queued snapshot to admit this one
    /// (recency over completeness) and counts the drop.
    pub async fn push(&self, snapshot: Snapshot) -> PushOutcome {
        let deadline = tokio::time::Instant::now() + self.push_timeout;
        loop {
            // Create the waiter before re-checking so a pop between the
            // unlock and the await is not missed.
            let notified = self.space.notified();
            {
                let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if queue.len() < self.capacity {
                    queue.push_back(snapshot);
                    drop(queue);
                    self.items.notify_one();
                    return PushOutcome::Queued;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let outcome;
                {
                    let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                    if queue.len() < self.capacity {
                        queue.push_back(snapshot);
                        outcome = PushOutcome::Queued;
                    } else {
                        queue.pop_front();
                        queue.push_back(snapshot);
                        self.dropped_oldest.fetch_add(1, Ordering::Relaxed);
                        outcome = PushOutcome::DroppedOldest;
                    }
                }
                self.items.notify_one();
                return outcome;
            }
        }
    }

    /// Strict FIFO pop; pends until a snapshot is available.
    pub async fn pop(&self) -> Snapshot {
        loop {
            let notified = self.items.notified();
            {
                let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(snapshot) = queue.pop_front() {
                    drop(queue);
                    self.space.notify_one();
                    return snapshot;
                }
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total snapshots discarded by the drop-oldest policy.
    pub fn dropped_oldest(&self) -> u64 {
        self.dropped_oldest.load(Ordering::Relaxed)
    }
}
