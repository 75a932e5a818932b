//! DeliveryTask - delivers one batch with bounded retries

use std::net::SocketAddr;
use std::sync::Arc;

use contracts::{MessageSet, ResultCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::counters::ClientCounters;
use crate::pool::ServerPool;
use crate::restore::{RestoreStore, StoredBatch};
use crate::transport::Transport;

/// Where a batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Handed in through `AsyncClient::send`
    Fresh,
    /// Taken from the restore store (sequence number)
    Replay(u64),
}

/// Final state of one `DeliveryTask`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { endpoint: SocketAddr, attempts: u32 },
    /// Handed to the restore store
    Restored { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Shared state every delivery needs
pub struct DeliveryContext<T> {
    pub pool: Arc<ServerPool>,
    pub transport: Arc<T>,
    pub store: Arc<RestoreStore>,
    pub counters: Arc<ClientCounters>,
    pub max_retries: u32,
}

impl<T> Clone for DeliveryContext<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            counters: Arc::clone(&self.counters),
            max_retries: self.max_retries,
        }
    }
}

/// One batch in flight
///
/// Never fails: every path ends in `Delivered` or `Restored`.
pub struct DeliveryTask<'a, T> {
    ctx: &'a DeliveryContext<T>,
    batch: MessageSet,
    origin: Origin,
    max_attempts: Option<u32>,
    cancel: Option<CancellationToken>,
}

impl<'a, T> DeliveryTask<'a, T>
where
    T: Transport + Sync,
{
    pub fn new(ctx: &'a DeliveryContext<T>, batch: MessageSet, origin: Origin) -> Self {
        Self {
            ctx,
            batch,
            origin,
            max_attempts: None,
            cancel: None,
        }
    }

    /// Cap the attempts below `max_retries + 1`
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Abandon the in-flight call once `cancel` fires; the batch is kept
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[instrument(
        name = "delivery_task",
        skip(self),
        fields(batch_id = %self.batch.id(), messages = self.batch.len(), origin = ?self.origin)
    )]
    pub async fn run(self) -> DeliveryOutcome {
        let ctx = self.ctx;
        let mut max_attempts = ctx.max_retries.saturating_add(1);
        if let Some(cap) = self.max_attempts {
            max_attempts = max_attempts.min(cap);
        }
        let mut attempts = 0u32;
        let mut avoid: Option<SocketAddr> = None;

        while attempts < max_attempts {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                debug!(attempts, "delivery cancelled");
                break;
            }
            let Some(endpoint) = ctx.pool.pick(avoid) else {
                debug!(attempts, "no eligible endpoint");
                break;
            };

            if attempts > 0 {
                ctx.counters.inc_retried();
                observability::record_batch_retried();
            }
            attempts += 1;

            let addr = endpoint.addr();
            let call = ctx.transport.call(addr, &self.batch);
            let result = match &self.cancel {
                Some(cancel) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = call => Some(result),
                },
                None => Some(call.await),
            };
            let Some(result) = result else {
                debug!(server = %addr, attempts, "delivery cancelled mid-call");
                break;
            };

            match result {
                Ok(result) => match result.code {
                    ResultCode::Ok => {
                        ctx.pool.report_success(&endpoint);
                        ctx.counters.add_sent(self.batch.len());
                        observability::record_batch_sent(self.batch.len());
                        if let Origin::Replay(seq) = self.origin {
                            ctx.store.complete(seq);
                        }
                        debug!(server = %addr, attempts, "batch delivered");
                        return DeliveryOutcome::Delivered {
                            endpoint: addr,
                            attempts,
                        };
                    }
                    ResultCode::TryLater => {
                        ctx.pool.report_busy(&endpoint);
                        debug!(server = %addr, attempts, "server busy");
                    }
                    ResultCode::OtherError => {
                        ctx.pool.report_failure(&endpoint);
                        warn!(
                            server = %addr,
                            attempts,
                            message = result.message.as_deref().unwrap_or(""),
                            "server rejected batch"
                        );
                    }
                },
                Err(e) => {
                    ctx.pool.report_failure(&endpoint);
                    warn!(server = %addr, attempts, error = %e, "delivery attempt failed");
                }
            }

            avoid = Some(addr);
        }

        match self.origin {
            Origin::Fresh => ctx.store.store(self.batch),
            Origin::Replay(seq) => ctx.store.requeue(StoredBatch::new(seq, self.batch)),
        }
        DeliveryOutcome::Restored { attempts }
    }
}
