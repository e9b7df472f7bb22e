//! Outbound packet queue between processors and the writer loop.
//!
//! Producers never wait on the writer. The queue is unbounded unless a
//! capacity is configured, in which case the oldest packet is dropped to
//! make room.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::relay::message::OutboundPacket;

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after evicting the oldest pending packet.
    QueuedDroppedOldest,
    /// The queue is closed; the packet was discarded.
    Discarded,
}

/// FIFO of pending packets plus a wake signal.
#[derive(Debug)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<OutboundPacket>>,
    wake: Notify,
    capacity: Option<usize>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<OutboundPacket>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail and wake the writer. Never blocks.
    pub fn enqueue(&self, packet: OutboundPacket) -> EnqueueOutcome {
        let outcome = {
            let mut items = self.items();
            // Checked under the lock so a concurrent close() cannot strand the packet.
            if self.closed.load(Ordering::Acquire) {
                tracing::trace!(stream = %packet.body.stream_name, "Queue closed, discarding packet");
                return EnqueueOutcome::Discarded;
            }
            let evicted = match self.capacity {
                Some(cap) if items.len() >= cap => items.pop_front(),
                _ => None,
            };
            items.push_back(packet);
            match evicted {
                Some(old) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        stream = %old.body.stream_name,
                        capacity = self.capacity.unwrap_or_default(),
                        "Outbound queue full, dropped oldest packet"
                    );
                    EnqueueOutcome::QueuedDroppedOldest
                }
                None => EnqueueOutcome::Queued,
            }
        };

        self.wake.notify_one();
        outcome
    }

    /// Remove and return the head, if any.
    pub fn try_dequeue(&self) -> Option<OutboundPacket> {
        self.items().pop_front()
    }

    /// Wait until work is signalled or the timeout elapses.
    ///
    /// Returns true if woken by an enqueue. A wake raised while nobody was
    /// waiting is kept, so it is never missed.
    pub async fn wait_for_work(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wake.notified()).await.is_ok()
    }

    /// Reject further packets and drop whatever is still pending.
    pub fn close(&self) -> usize {
        let pending = {
            let mut items = self.items();
            self.closed.store(true, Ordering::Release);
            let n = items.len();
            items.clear();
            n
        };
        self.wake.notify_waiters();
        pending
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Packets evicted by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::message::StreamState;
    use serde_json::json;
    use std::sync::Arc;

    fn packet(n: usize) -> OutboundPacket {
        OutboundPacket::new(format!("s{}", n), StreamState::Data, json!(n))
    }

    #[test]
    fn fifo_order() {
        let q = OutboundQueue::unbounded();
        for i in 0..100 {
            assert_eq!(q.enqueue(packet(i)), EnqueueOutcome::Queued);
        }
        for i in 0..100 {
            assert_eq!(q.try_dequeue().unwrap().body.data, json!(i));
        }
        assert!(q.try_dequeue().is_none());
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let q = OutboundQueue::with_capacity(Some(2));
        q.enqueue(packet(1));
        q.enqueue(packet(2));
        assert_eq!(q.enqueue(packet(3)), EnqueueOutcome::QueuedDroppedOldest);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.try_dequeue().unwrap().body.data, json!(2));
        assert_eq!(q.try_dequeue().unwrap().body.data, json!(3));
    }

    #[test]
    fn closed_queue_discards() {
        let q = OutboundQueue::unbounded();
        q.enqueue(packet(1));
        assert_eq!(q.close(), 1);
        assert_eq!(q.enqueue(packet(2)), EnqueueOutcome::Discarded);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn wake_is_not_lost_before_wait() {
        let q = OutboundQueue::unbounded();
        q.enqueue(packet(1));
        assert!(q.wait_for_work(Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn wait_times_out_without_work() {
        let q = OutboundQueue::unbounded();
        assert!(!q.wait_for_work(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn concurrent_producers_lose_nothing() {
        let q = Arc::new(OutboundQueue::unbounded());
        let mut tasks = Vec::new();
        for t in 0..4 {
            let q = Arc::clone(&q);
            tasks.push(tokio::spawn(async move {
                for i in 0..250 {
                    q.enqueue(packet(t * 1000 + i));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(q.len(), 1000);
    }
}
