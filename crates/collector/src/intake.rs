//! IntakeQueue - bounded buffer between RPC handlers and the router

use std::sync::atomic::{AtomicU64, Ordering};

use async_channel::{Receiver, Sender, TrySendError};
use contracts::MessageSet;
use serde::Serialize;
use thiserror::Error;

/// Why a batch was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("intake queue full")]
    Full,
    #[error("intake queue closed")]
    Closed,
}

/// Introspection view served on `/intakestat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeStats {
    pub depth: usize,
    pub capacity: usize,
    pub accepted: u64,
    pub rejected: u64,
}

/// Bounded FIFO of accepted batches
///
/// `offer` never waits; a full queue is the collector's backpressure signal.
#[derive(Debug)]
pub struct IntakeQueue {
    tx: Sender<MessageSet>,
    rx: Receiver<MessageSet>,
    capacity: usize,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl IntakeQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn offer(&self, set: MessageSet) -> Result<(), IntakeError> {
        let result = match self.tx.try_send(set) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(IntakeError::Full),
            Err(TrySendError::Closed(_)) => Err(IntakeError::Closed),
        };

        match result {
            Ok(()) => self.accepted.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.rejected.fetch_add(1, Ordering::Relaxed),
        };
        observability::record_intake_offer(result.is_ok());
        observability::record_intake_depth(self.depth());
        result
    }

    /// Batches waiting for the router
    pub fn depth(&self) -> usize {
        self.tx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consumer side; queued batches stay readable after `close`
    pub fn receiver(&self) -> Receiver<MessageSet> {
        self.rx.clone()
    }

    /// Reject further offers
    pub fn close(&self) {
        self.tx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> IntakeStats {
        IntakeStats {
            depth: self.depth(),
            capacity: self.capacity,
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> MessageSet {
        MessageSet::builder("app").with_message("m").build()
    }

    #[test]
    fn full_queue_rejects_next_offer() {
        let queue = IntakeQueue::new(2);
        assert!(queue.offer(set()).is_ok());
        assert!(queue.offer(set()).is_ok());
        assert_eq!(queue.offer(set()), Err(IntakeError::Full));

        let stats = queue.stats();
        assert_eq!(stats, IntakeStats { depth: 2, capacity: 2, accepted: 2, rejected: 1 });
    }

    #[tokio::test]
    async fn closed_queue_rejects_but_stays_drainable() {
        let queue = IntakeQueue::new(4);
        queue.offer(set()).unwrap();
        queue.close();

        assert_eq!(queue.offer(set()), Err(IntakeError::Closed));
        let rx = queue.receiver();
        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_err());
    }
}
