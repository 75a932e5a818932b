//! Router - resolves destination sinks per message and forwards

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::Receiver;
use contracts::{Message, MessageSet, RoutingConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::handle::{SinkHandle, SinkRejected};
use crate::registry::SinkRegistry;

/// App name -> destination sink names, with an optional fallback
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    default_sink: Option<String>,
    routes: HashMap<String, Vec<String>>,
}

impl RoutingTable {
    pub fn new(default_sink: Option<String>, routes: HashMap<String, Vec<String>>) -> Self {
        Self {
            default_sink,
            routes,
        }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(config.default_sink.clone(), config.routes.clone())
    }

    /// Explicit routes for `app` if any, otherwise the default sink
    pub fn destinations(&self, app: &str) -> &[String] {
        match self.routes.get(app) {
            Some(sinks) => sinks,
            None => self.default_sink.as_slice(),
        }
    }
}

/// Router counters
#[derive(Debug, Default)]
pub struct RouterStats {
    batches: AtomicU64,
    messages: AtomicU64,
    /// Successful sink writes (one message may count several times)
    routed: AtomicU64,
    /// Messages that reached no sink at all
    unrouted: AtomicU64,
    /// Destination names not present in the registry
    missing_destinations: AtomicU64,
    sink_failures: AtomicU64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            missing_destinations: self.missing_destinations.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStatsSnapshot {
    pub batches: u64,
    pub messages: u64,
    pub routed: u64,
    pub unrouted: u64,
    pub missing_destinations: u64,
    pub sink_failures: u64,
}

/// Result of dispatching one message (or the sum over a batch)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sink writes accepted
    pub delivered: usize,
    /// Sinks that rejected the message
    pub failed: usize,
    /// Destination names with no sink
    pub missing: usize,
    /// Messages that reached no sink
    pub unrouted: usize,
}

impl std::ops::AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.missing += other.missing;
        self.unrouted += other.unrouted;
    }
}

/// Forwards messages from the intake queue to sinks
///
/// Sink writes never block: a full or closed sink is counted and skipped so
/// the other destinations still receive the message.
pub struct Router {
    registry: Arc<SinkRegistry>,
    table: RoutingTable,
    stats: RouterStats,
}

impl Router {
    pub fn new(registry: Arc<SinkRegistry>, table: RoutingTable) -> Self {
        Self {
            registry,
            table,
            stats: RouterStats::default(),
        }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    fn write(&self, handle: &Arc<SinkHandle>, message: &Message) -> Result<(), SinkRejected> {
        let mut handle = Arc::clone(handle);
        loop {
            match handle.try_write(message.clone()) {
                // A concurrent rebuild may have closed this handle; follow the newer set
                Err(SinkRejected::Closed) => match self.registry.lookup(handle.name()) {
                    Some(current) if !Arc::ptr_eq(&current, &handle) => handle = current,
                    _ => return Err(SinkRejected::Closed),
                },
                other => return other,
            }
        }
    }

    /// Forward one message to each of its destinations
    pub fn dispatch(&self, message: &Message) -> DispatchReport {
        self.stats.messages.fetch_add(1, Ordering::Relaxed);
        let sinks = self.registry.snapshot();
        let mut report = DispatchReport::default();

        for name in self.table.destinations(message.app()) {
            let Some(handle) = sinks.get(name) else {
                report.missing += 1;
                self.stats.missing_destinations.fetch_add(1, Ordering::Relaxed);
                debug!(sink = %name, app = %message.app(), "Destination sink not registered");
                continue;
            };
            match self.write(handle, message) {
                Ok(()) => {
                    report.delivered += 1;
                    self.stats.routed.fetch_add(1, Ordering::Relaxed);
                    observability::record_message_routed(name);
                }
                Err(rejected) => {
                    report.failed += 1;
                    self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                    observability::record_sink_failure(name, rejected.as_str());
                    debug!(sink = %name, reason = rejected.as_str(), "Sink rejected message");
                }
            }
        }

        if report.delivered == 0 && report.failed == 0 {
            report.unrouted = 1;
            self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
            observability::record_message_unrouted(message.app());
            warn!(app = %message.app(), "Message dropped: no destination sink");
        }
        report
    }

    /// Dispatch every message of a batch, in batch order
    pub fn dispatch_batch(&self, set: &MessageSet) -> DispatchReport {
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        let mut report = DispatchReport::default();
        for message in set.messages() {
            report += self.dispatch(message);
        }
        report
    }

    /// Consume batches until the intake closes and drains, or `cancel` fires
    #[instrument(name = "router_run", skip_all)]
    pub async fn run(&self, intake: Receiver<MessageSet>, cancel: CancellationToken) {
        info!("Router started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = intake.recv() => match received {
                    Ok(set) => {
                        observability::record_intake_depth(intake.len());
                        let report = self.dispatch_batch(&set);
                        debug!(
                            batch_id = %set.id(),
                            messages = set.len(),
                            delivered = report.delivered,
                            failed = report.failed,
                            unrouted = report.unrouted,
                            "Batch routed"
                        );
                    }
                    Err(_) => break,
                },
            }
        }

        let stats = self.stats();
        info!(
            batches = stats.batches,
            messages = stats.messages,
            unrouted = stats.unrouted,
            sink_failures = stats.sink_failures,
            "Router stopped"
        );
    }
}
