//! Delivery counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Observable record of client activity
///
/// - `sent`: messages acknowledged `Ok`, counted once per batch
/// - `retried`: retry attempts actually issued
/// - `restored`: messages that entered the restore store
#[derive(Debug, Default)]
pub struct ClientCounters {
    sent: AtomicU64,
    sent_batches: AtomicU64,
    retried: AtomicU64,
    restored: AtomicU64,
}

impl ClientCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Record a delivered batch of `messages`
    pub fn add_sent(&self, messages: usize) {
        self.sent.fetch_add(messages as u64, Ordering::Relaxed);
        self.sent_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_batches(&self) -> u64 {
        self.sent_batches.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn inc_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn restored(&self) -> u64 {
        self.restored.load(Ordering::Relaxed)
    }

    pub fn add_restored(&self, messages: usize) {
        self.restored.fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sent: self.sent(),
            sent_batches: self.sent_batches(),
            retried: self.retried(),
            restored: self.restored(),
        }
    }
}

/// Point-in-time copy of `ClientCounters`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent: u64,
    pub sent_batches: u64,
    pub retried: u64,
    pub restored: u64,
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent={} ({} batches), retried={}, restored={}",
            self.sent, self.sent_batches, self.retried, self.restored
        )
    }
}
