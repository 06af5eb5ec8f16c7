//! Dead letter queue for abandoned requests.
//!
//! Worker-side failures are never retried and never reach a caller. The
//! affected request is left in whatever state the store holds and an entry is
//! pushed here so operators can see which requests will never finish, and why.
//!
//! The queue is bounded. Once full, each new entry evicts the oldest one and
//! bumps `asyncreq_dlq_evicted_total`; the pool reports itself unhealthy while
//! that is happening.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One abandoned request.
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    /// What was abandoned (for the worker pool, an [`AbandonedRequest`](crate::worker::AbandonedRequest))
    pub payload: T,

    /// Rendered failure, suitable for logs and dashboards
    pub reason: String,

    /// Wall-clock time the request was given up on
    pub abandoned_at: DateTime<Utc>,
}

/// Bounded, drop-oldest record of abandoned requests.
///
/// Clones share storage, so the pool and an operator endpoint can hold the
/// same queue.
///
/// # Example
///
/// ```
/// use asyncreq_runtime::dead_letter::DeadLetterQueue;
///
/// let dlq = DeadLetterQueue::new(2);
/// dlq.push("req-a", "record expired during processing".to_string());
/// dlq.push("req-b", "finalize write failed".to_string());
/// dlq.push("req-c", "finalize write failed".to_string());
///
/// assert_eq!(dlq.len(), 2);
/// assert_eq!(dlq.peek().map(|e| e.payload), Some("req-b"));
/// ```
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    entries: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Queue holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(max_size.min(64)))),
            max_size,
        }
    }

    // A panic while holding the lock cannot leave the deque half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<DeadLetter<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an abandoned request, evicting the oldest entry when full.
    pub fn push(&self, payload: T, reason: String) {
        let mut entries = self.lock();

        if entries.len() >= self.max_size && entries.pop_front().is_some() {
            metrics::counter!("asyncreq_dlq_evicted_total").increment(1);
            tracing::warn!(max_size = self.max_size, "Dead letter queue full, evicted oldest entry");
        }

        entries.push_back(DeadLetter {
            payload,
            reason,
            abandoned_at: Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)] // bounded by max_size
        metrics::gauge!("asyncreq_dlq_size").set(entries.len() as f64);
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no request has been abandoned since the last drain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every entry, oldest first.
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let entries: Vec<_> = self.lock().drain(..).collect();

        metrics::gauge!("asyncreq_dlq_size").set(0.0);
        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// The oldest entry, left in place.
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter<T>>
    where
        T: Clone,
    {
        self.lock().front().cloned()
    }

    /// Capacity before eviction starts.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            max_size: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_oldest_first_and_empties() {
        let dlq = DeadLetterQueue::new(10);
        dlq.push(1, "one".to_string());
        dlq.push(2, "two".to_string());

        let drained = dlq.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload, 1);
        assert_eq!(drained[1].reason, "two");
        assert!(dlq.is_empty());
    }

    #[test]
    fn test_full_queue_evicts_oldest() {
        let dlq = DeadLetterQueue::new(2);
        dlq.push("a", "expired".to_string());
        dlq.push("b", "expired".to_string());
        dlq.push("c", "write failed".to_string());

        assert_eq!(dlq.len(), 2);
        let remaining: Vec<_> = dlq.drain().into_iter().map(|e| e.payload).collect();
        assert_eq!(remaining, vec!["b", "c"]);
    }

    #[test]
    fn test_clones_share_storage() {
        let dlq = DeadLetterQueue::new(10);
        let other = dlq.clone();
        other.push("x", "failed".to_string());
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq.peek().map(|e| e.reason), Some("failed".to_string()));
    }
}
