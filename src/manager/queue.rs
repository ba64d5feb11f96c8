//! Priority queue for request slots
//!
//! Slots order by (priority, enqueue sequence) among those whose deferral
//! has elapsed. Retries re-enter with a `deferred_until` in the future and
//! keep their original sequence number, so a retried request does not jump
//! ahead of its peers when it becomes dispatchable again.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use tokio::sync::{oneshot, Notify};

use crate::schema::{Priority, ProcessingResult, ScrapingOptions, ScrapingTarget};

/// A queued request and the channel its caller is waiting on.
pub struct RequestSlot {
    pub target: ScrapingTarget,
    pub options: ScrapingOptions,
    pub priority: Priority,
    pub enqueue_seq: u64,
    pub enqueued_at: Instant,
    /// Completed dispatch attempts so far.
    pub attempt: u32,
    pub deferred_until: Option<Instant>,
    pub responder: oneshot::Sender<ProcessingResult>,
}

impl RequestSlot {
    /// Dispatchable now?
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deferred_until.is_none_or(|until| until <= now)
    }

    /// Complete the caller's `add_request` with `result`.
    pub fn respond(self, result: ProcessingResult) {
        // The caller may have gone away; nothing to do then
        let _ = self.responder.send(result);
    }
}

impl PartialEq for RequestSlot {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueue_seq == other.enqueue_seq
    }
}

impl Eq for RequestSlot {}

impl PartialOrd for RequestSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequestSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then FIFO by sequence
        self.priority
            .weight()
            .cmp(&other.priority.weight())
            .then_with(|| other.enqueue_seq.cmp(&self.enqueue_seq))
    }
}

#[derive(Default)]
struct QueueState {
    ready: BinaryHeap<RequestSlot>,
    deferred: Vec<RequestSlot>,
    next_seq: u64,
}

/// Gauge values surfaced through `getStats()`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueGauges {
    pub queued: usize,
    pub deferred: usize,
}

/// Shared slot queue; the dispatcher is the only consumer.
#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl RequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a fresh request.
    pub fn push_new(
        &self,
        target: ScrapingTarget,
        options: ScrapingOptions,
        responder: oneshot::Sender<ProcessingResult>,
    ) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let priority = target.priority;
        state.ready.push(RequestSlot {
            target,
            options,
            priority,
            enqueue_seq: seq,
            enqueued_at: Instant::now(),
            attempt: 0,
            deferred_until: None,
            responder,
        });
        drop(state);
        self.notify.notify_one();
    }

    /// Re-enqueue a slot for retry after its backoff.
    pub fn push_retry(&self, mut slot: RequestSlot, deferred_until: Instant) {
        slot.deferred_until = Some(deferred_until);
        self.state.lock().deferred.push(slot);
        self.notify.notify_one();
    }

    /// Pop the best dispatchable slot, promoting due deferrals first.
    pub fn pop_ready(&self) -> Option<RequestSlot> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let mut index = 0;
        while index < state.deferred.len() {
            if state.deferred[index].is_due(now) {
                let slot = state.deferred.swap_remove(index);
                state.ready.push(slot);
            } else {
                index += 1;
            }
        }

        state.ready.pop()
    }

    /// Earliest deferral deadline, for the dispatcher's sleep.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .deferred
            .iter()
            .filter_map(|slot| slot.deferred_until)
            .min()
    }

    /// Remove everything queued; callers receive the drained slots.
    #[must_use]
    pub fn drain(&self) -> Vec<RequestSlot> {
        let mut state = self.state.lock();
        let mut drained: Vec<RequestSlot> = state.ready.drain().collect();
        drained.append(&mut state.deferred);
        drained
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.ready.is_empty() && state.deferred.is_empty()
    }

    #[must_use]
    pub fn gauges(&self) -> QueueGauges {
        let state = self.state.lock();
        QueueGauges {
            queued: state.ready.len(),
            deferred: state.deferred.len(),
        }
    }

    /// Wait until something is pushed.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn target(id: &str, priority: Priority) -> ScrapingTarget {
        ScrapingTarget::new(id, id, format!("https://example.com/{id}")).with_priority(priority)
    }

    fn push(queue: &RequestQueue, id: &str, priority: Priority) {
        let (tx, _rx) = oneshot::channel();
        queue.push_new(target(id, priority), ScrapingOptions::default(), tx);
    }

    #[test]
    fn test_priority_order_beats_fifo() {
        let queue = RequestQueue::new();
        push(&queue, "low", Priority::Low);
        push(&queue, "critical", Priority::Critical);
        push(&queue, "medium", Priority::Medium);

        assert_eq!(queue.pop_ready().expect("slot").target.id, "critical");
        assert_eq!(queue.pop_ready().expect("slot").target.id, "medium");
        assert_eq!(queue.pop_ready().expect("slot").target.id, "low");
        assert!(queue.pop_ready().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = RequestQueue::new();
        push(&queue, "first", Priority::High);
        push(&queue, "second", Priority::High);
        push(&queue, "third", Priority::High);

        assert_eq!(queue.pop_ready().expect("slot").target.id, "first");
        assert_eq!(queue.pop_ready().expect("slot").target.id, "second");
        assert_eq!(queue.pop_ready().expect("slot").target.id, "third");
    }

    #[test]
    fn test_deferred_slot_not_dispatchable_until_due() {
        let queue = RequestQueue::new();
        push(&queue, "deferred", Priority::Critical);
        let slot = queue.pop_ready().expect("slot");
        queue.push_retry(slot, Instant::now() + Duration::from_secs(60));

        push(&queue, "ready", Priority::Low);

        // The critical slot is deferred; the low one dispatches
        assert_eq!(queue.pop_ready().expect("slot").target.id, "ready");
        assert!(queue.pop_ready().is_none());
        assert!(queue.next_deadline().is_some());
        assert_eq!(queue.gauges().deferred, 1);
    }

    #[test]
    fn test_due_deferred_promotes_with_priority() {
        let queue = RequestQueue::new();
        push(&queue, "high-retry", Priority::High);
        let slot = queue.pop_ready().expect("slot");
        // Already due
        queue.push_retry(slot, Instant::now() - Duration::from_millis(1));

        push(&queue, "medium", Priority::Medium);

        assert_eq!(queue.pop_ready().expect("slot").target.id, "high-retry");
        assert_eq!(queue.pop_ready().expect("slot").target.id, "medium");
    }

    #[test]
    fn test_drain_empties_both_sets() {
        let queue = RequestQueue::new();
        push(&queue, "a", Priority::Medium);
        push(&queue, "b", Priority::Medium);
        let slot = queue.pop_ready().expect("slot");
        queue.push_retry(slot, Instant::now() + Duration::from_secs(60));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
