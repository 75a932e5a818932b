//! Per-sink counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Messages waiting in the sink queue
    queue_len: AtomicUsize,
    /// Messages accepted into the queue
    enqueued: AtomicU64,
    written: AtomicU64,
    write_failures: AtomicU64,
    /// Rejected because the queue was full
    rejected_full: AtomicU64,
    /// Rejected because the sink was closed
    rejected_closed: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn inc_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn inc_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_full(&self) -> u64 {
        self.rejected_full.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_full(&self) {
        self.rejected_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_closed(&self) -> u64 {
        self.rejected_closed.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_closed(&self) {
        self.rejected_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            enqueued: self.enqueued(),
            written: self.written(),
            write_failures: self.write_failures(),
            rejected_full: self.rejected_full(),
            rejected_closed: self.rejected_closed(),
        }
    }
}

/// Point-in-time copy of `SinkMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub enqueued: u64,
    pub written: u64,
    pub write_failures: u64,
    pub rejected_full: u64,
    pub rejected_closed: u64,
}
