//! AsyncClient - non-blocking entry point for producers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{ClientConfig, MessageSet};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::counters::{ClientCounters, CounterSnapshot};
use crate::delivery::{DeliveryContext, DeliveryTask, Origin};
use crate::pool::ServerPool;
use crate::restore::{drain_pass, spawn_replay, RestoreStore};
use crate::transport::{TcpTransport, Transport};
use crate::ClientError;

/// Summary returned by `AsyncClient::shutdown`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Batches delivered by the final replay pass
    pub drained: usize,
    /// Batches still in the restore store
    pub pending_batches: usize,
    pub pending_messages: usize,
    /// Workers still busy when the shutdown timeout elapsed
    pub workers_timed_out: usize,
    pub counters: CounterSnapshot,
}

enum Lifecycle {
    Running {
        workers: Vec<JoinHandle<()>>,
        replay: JoinHandle<()>,
    },
    Stopped(ShutdownReport),
}

/// Asynchronous delivery client
///
/// `send` only enqueues; delivery happens on `worker_count` background
/// workers. Must be started inside a tokio runtime.
pub struct AsyncClient<T>
where
    T: Transport + Send + Sync + 'static,
{
    ctx: DeliveryContext<T>,
    queue: Sender<MessageSet>,
    queue_capacity: usize,
    accepting: AtomicBool,
    /// Stops the replay loop
    cancel: CancellationToken,
    /// Fires at the shutdown deadline; abandons replay and drain calls
    abort: CancellationToken,
    shutdown_timeout: std::time::Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl AsyncClient<TcpTransport> {
    /// Start a client talking TCP to the configured collectors
    pub fn with_tcp(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::start(config, TcpTransport::from_config(config))
    }
}

impl<T> AsyncClient<T>
where
    T: Transport + Send + Sync + 'static,
{
    /// Build the pool and restore store, then spawn workers and the replay loop
    #[instrument(name = "async_client_start", skip(config, transport), fields(app = %config.app))]
    pub fn start(config: &ClientConfig, transport: T) -> Result<Self, ClientError> {
        let pool = Arc::new(ServerPool::from_config(config)?);
        let counters = Arc::new(ClientCounters::new());
        let store = Arc::new(RestoreStore::from_config(config, Arc::clone(&counters))?);

        let ctx = DeliveryContext {
            pool,
            transport: Arc::new(transport),
            store,
            counters,
            max_retries: config.max_retries,
        };

        let queue_capacity = config.queue_capacity.max(1);
        let (tx, rx) = async_channel::bounded(queue_capacity);
        let cancel = CancellationToken::new();
        let abort = CancellationToken::new();

        let worker_count = config.worker_count.max(1);
        let workers = (0..worker_count)
            .map(|id| {
                let ctx = ctx.clone();
                let rx = rx.clone();
                tokio::spawn(async move { delivery_worker(id, ctx, rx).await })
            })
            .collect();
        let replay = spawn_replay(ctx.clone(), config.restore_interval(), cancel.clone(), abort.clone());

        info!(
            servers = ctx.pool.len(),
            workers = worker_count,
            queue_capacity,
            max_retries = config.max_retries,
            "client started"
        );

        Ok(Self {
            ctx,
            queue: tx,
            queue_capacity,
            accepting: AtomicBool::new(true),
            cancel,
            abort,
            shutdown_timeout: config.shutdown_timeout(),
            lifecycle: Mutex::new(Lifecycle::Running { workers, replay }),
        })
    }

    /// Enqueue a batch for delivery without blocking
    ///
    /// The batch is handed back inside the error when it is rejected.
    pub fn send(&self, batch: MessageSet) -> Result<(), ClientError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(ClientError::ShuttingDown {
                batch: Box::new(batch),
            });
        }
        match self.queue.try_send(batch) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(batch)) => {
                warn!(batch_id = %batch.id(), capacity = self.queue_capacity, "delivery queue full");
                Err(ClientError::QueueFull {
                    capacity: self.queue_capacity,
                    batch: Box::new(batch),
                })
            }
            Err(TrySendError::Closed(batch)) => Err(ClientError::ShuttingDown {
                batch: Box::new(batch),
            }),
        }
    }

    /// Stop accepting, deliver what is queued, drain the restore store once
    ///
    /// The whole call is bounded by `shutdown_timeout`; batches not delivered
    /// by then stay in the restore store. Idempotent: later calls return the
    /// first report.
    #[instrument(name = "async_client_shutdown", skip(self))]
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut lifecycle = self.lifecycle.lock().await;
        let (workers, replay) = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped(ShutdownReport::default())) {
            Lifecycle::Running { workers, replay } => (workers, replay),
            Lifecycle::Stopped(report) => {
                *lifecycle = Lifecycle::Stopped(report);
                return report;
            }
        };

        self.accepting.store(false, Ordering::Release);
        self.queue.close();
        info!(queued = self.queue.len(), "client shutting down");

        let deadline = Instant::now() + self.shutdown_timeout;
        let deadline_timer = {
            let abort = self.abort.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                abort.cancel();
            })
        };

        let mut workers_timed_out = 0;
        for worker in workers {
            match tokio::time::timeout_at(deadline, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "delivery worker failed"),
                Err(_) => workers_timed_out += 1,
            }
        }
        if workers_timed_out > 0 {
            warn!(workers = workers_timed_out, "shutdown timeout elapsed with workers still busy");
        }

        // a replay pass in progress ends by the deadline at the latest
        self.cancel.cancel();
        if let Err(e) = replay.await {
            warn!(error = %e, "replay loop failed");
        }

        let drain = drain_pass(&self.ctx, &self.abort).await;
        deadline_timer.abort();
        if self.abort.is_cancelled() {
            warn!(pending = self.ctx.store.len(), "shutdown deadline reached before the restore store drained");
        }
        debug!(delivered = drain.delivered, requeued = drain.requeued, "final replay pass");

        self.ctx.transport.close().await;
        self.ctx.pool.clear();

        let report = ShutdownReport {
            drained: drain.delivered,
            pending_batches: self.ctx.store.len(),
            pending_messages: self.ctx.store.pending_messages(),
            workers_timed_out,
            counters: self.ctx.counters.snapshot(),
        };
        info!(
            drained = report.drained,
            pending = report.pending_batches,
            counters = %report.counters,
            "client stopped"
        );
        *lifecycle = Lifecycle::Stopped(report);
        report
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Batches waiting for a worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.ctx.counters.snapshot()
    }

    pub fn sent_message_count(&self) -> u64 {
        self.ctx.counters.sent()
    }

    pub fn retried_count(&self) -> u64 {
        self.ctx.counters.retried()
    }

    pub fn restored_message_count(&self) -> u64 {
        self.ctx.counters.restored()
    }

    pub fn pool(&self) -> &ServerPool {
        &self.ctx.pool
    }

    pub fn restore_store(&self) -> &RestoreStore {
        &self.ctx.store
    }

    pub fn transport(&self) -> &T {
        &self.ctx.transport
    }
}

impl<T> Drop for AsyncClient<T>
where
    T: Transport + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.queue.close();
        self.cancel.cancel();
        self.abort.cancel();
    }
}

async fn delivery_worker<T>(id: usize, ctx: DeliveryContext<T>, rx: Receiver<MessageSet>)
where
    T: Transport + Sync,
{
    debug!(worker = id, "delivery worker started");
    while let Ok(batch) = rx.recv().await {
        DeliveryTask::new(&ctx, batch, Origin::Fresh).run().await;
    }
    debug!(worker = id, "delivery worker stopped");
}
