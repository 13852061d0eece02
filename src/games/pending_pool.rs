use crate::games::types::{DieTriple, RequestId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Thread-safe pool of callers waiting for a roll request to be fulfilled
pub struct PendingRollsPool {
    /// Map of request_id -> oneshot senders
    pending: Arc<DashMap<RequestId, Vec<oneshot::Sender<Vec<DieTriple>>>>>,
}

impl PendingRollsPool {
    /// Create a new pending rolls pool
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Add a waiter for a request
    pub fn add_waiter(&self, request_id: RequestId, sender: oneshot::Sender<Vec<DieTriple>>) {
        self.pending.entry(request_id).or_default().push(sender);
    }

    /// Complete a request and send the triples to every waiter
    pub fn complete(&self, request_id: RequestId, triples: &[DieTriple]) -> usize {
        let Some((_, senders)) = self.pending.remove(&request_id) else {
            return 0;
        };

        let mut delivered = 0;
        for sender in senders {
            // Receiver may have been dropped
            if sender.send(triples.to_vec()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Get number of requests with waiters
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }
}

impl Default for PendingRollsPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_pool() {
        let pool = PendingRollsPool::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        pool.add_waiter(RequestId(1), tx1);
        pool.add_waiter(RequestId(1), tx2);
        assert_eq!(pool.pending_count(), 1);
        assert!(pool.is_pending(RequestId(1)));

        let triple = DieTriple::new(4, 5, 6).unwrap();
        assert_eq!(pool.complete(RequestId(1), &[triple]), 2);

        assert_eq!(rx1.await.expect("Should receive triples"), vec![triple]);
        assert_eq!(rx2.await.expect("Should receive triples"), vec![triple]);
        assert_eq!(pool.pending_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_skipped() {
        let pool = PendingRollsPool::new();
        let (tx, rx) = oneshot::channel();
        pool.add_waiter(RequestId(3), tx);
        drop(rx);

        assert_eq!(pool.complete(RequestId(3), &[]), 0);
        assert!(!pool.is_pending(RequestId(3)));
        assert_eq!(pool.complete(RequestId(3), &[]), 0);
    }
}
