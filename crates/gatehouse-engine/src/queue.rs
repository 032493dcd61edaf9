//! Bounded FIFO queues between the two execution contexts.
//!
//! Producers never wait: when a queue is full the item is dropped and the
//! queue's drop counter is incremented. Counters are read by the health
//! report.

use gatehouse_core::QueueDrops;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Shared overflow counter for one queue
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    /// Items dropped so far
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Drop counters of the three inter-context queues
#[derive(Debug, Clone, Default)]
pub struct QueueDropCounters {
    /// Audit-mirror queue
    pub audit: DropCounter,
    /// Pending-notice queue
    pub pending: DropCounter,
    /// Control-signal queue
    pub control: DropCounter,
}

impl QueueDropCounters {
    /// Current totals, as published in the health report
    pub fn snapshot(&self) -> QueueDrops {
        QueueDrops::new(self.audit.get(), self.pending.get(), self.control.get())
    }
}

/// Producer half of a bounded queue
#[derive(Debug)]
pub struct QueueSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    dropped: DropCounter,
}

// Derived Clone would require `T: Clone`.
impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue without waiting. Returns `false` if the item was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                let dropped = self.dropped.increment();
                tracing::warn!(queue = self.name, dropped, "queue full, item dropped");
                false
            }
        }
    }

    /// Overflow counter of this queue
    pub fn drops(&self) -> DropCounter {
        self.dropped.clone()
    }
}

/// Consumer half of a bounded queue
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Take the next item if one is ready.
    pub fn try_next(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take up to `max` ready items, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<T> {
        let mut items = Vec::with_capacity(max.min(self.rx.len()));
        while items.len() < max {
            match self.try_next() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    /// Number of items waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no items are waiting
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a bounded queue with `capacity` slots.
pub fn bounded<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender {
            name,
            tx,
            dropped: DropCounter::default(),
        },
        QueueReceiver { rx },
    )
}
