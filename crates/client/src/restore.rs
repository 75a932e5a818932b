//! RestoreStore - holding area for undeliverable batches
//!
//! Batches enter the store when a delivery task runs out of attempts or finds
//! no eligible endpoint. A background loop replays them through the normal
//! delivery path. The directory backend writes one bincode file per batch so
//! pending batches survive a restart; a file is removed only once its batch
//! has been acknowledged.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{ClientConfig, MessageSet};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::counters::ClientCounters;
use crate::delivery::{DeliveryContext, DeliveryTask, Origin};
use crate::transport::Transport;
use crate::RestoreError;

const BATCH_EXTENSION: &str = "batch";

/// A batch held by the store, tagged with its sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBatch {
    seq: u64,
    batch: MessageSet,
}

impl StoredBatch {
    pub fn new(seq: u64, batch: MessageSet) -> Self {
        Self { seq, batch }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn batch(&self) -> &MessageSet {
        &self.batch
    }

    pub fn into_parts(self) -> (u64, MessageSet) {
        (self.seq, self.batch)
    }
}

#[derive(Debug, Clone)]
enum Backend {
    Memory,
    Directory(PathBuf),
}

/// FIFO of undelivered batches
#[derive(Debug)]
pub struct RestoreStore {
    backend: Backend,
    pending: Mutex<VecDeque<StoredBatch>>,
    next_seq: AtomicU64,
    counters: Arc<ClientCounters>,
}

impl RestoreStore {
    /// In-memory store
    pub fn memory(counters: Arc<ClientCounters>) -> Self {
        Self {
            backend: Backend::Memory,
            pending: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            counters,
        }
    }

    /// Directory-backed store, recovering batches left by a previous run
    ///
    /// Recovered batches were counted by the run that stored them and are not
    /// counted again.
    pub fn open_dir(path: impl Into<PathBuf>, counters: Arc<ClientCounters>) -> Result<Self, RestoreError> {
        let path = path.into();
        fs::create_dir_all(&path)?;

        let mut recovered = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry_path = entry?.path();
            let Some(seq) = parse_seq(&entry_path) else {
                continue;
            };
            match read_batch(&entry_path) {
                Ok(batch) => recovered.push(StoredBatch::new(seq, batch)),
                Err(e) => warn!(path = %entry_path.display(), error = %e, "skipping unreadable batch file"),
            }
        }
        recovered.sort_by_key(StoredBatch::seq);

        let next_seq = recovered.last().map_or(0, |last| last.seq + 1);
        if !recovered.is_empty() {
            info!(
                path = %path.display(),
                batches = recovered.len(),
                "recovered pending batches"
            );
        }

        Ok(Self {
            backend: Backend::Directory(path),
            pending: Mutex::new(recovered.into()),
            next_seq: AtomicU64::new(next_seq),
            counters,
        })
    }

    pub fn from_config(config: &ClientConfig, counters: Arc<ClientCounters>) -> Result<Self, RestoreError> {
        match &config.restore_dir {
            Some(dir) => Self::open_dir(dir, counters),
            None => Ok(Self::memory(counters)),
        }
    }

    /// Spill directory, if any
    pub fn directory(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Memory => None,
            Backend::Directory(path) => Some(path),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StoredBatch>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a batch that could not be delivered
    ///
    /// Never fails: if the spill file cannot be written the batch stays in memory.
    pub fn store(&self, batch: MessageSet) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let messages = batch.len();

        if let Backend::Directory(dir) = &self.backend {
            if let Err(e) = write_batch(&batch_path(dir, seq), &batch) {
                error!(batch_id = %batch.id(), error = %e, "failed to persist batch, keeping in memory");
            }
        }

        let depth = {
            let mut pending = self.lock();
            pending.push_back(StoredBatch::new(seq, batch));
            pending.len()
        };

        self.counters.add_restored(messages);
        observability::record_batch_restored(messages);
        observability::record_restore_depth(depth);
        debug!(seq, messages, depth, "batch stored for replay");
    }

    /// Put back a replayed batch that failed again
    pub fn requeue(&self, stored: StoredBatch) {
        let depth = {
            let mut pending = self.lock();
            pending.push_back(stored);
            pending.len()
        };
        observability::record_restore_depth(depth);
    }

    /// Forget a replayed batch after it was acknowledged
    pub fn complete(&self, seq: u64) {
        if let Backend::Directory(dir) = &self.backend {
            match fs::remove_file(batch_path(dir, seq)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(seq, error = %e, "failed to remove delivered batch file"),
            }
        }
    }

    /// Drain every pending batch, oldest first
    pub fn take_all(&self) -> Vec<StoredBatch> {
        let taken: Vec<StoredBatch> = self.lock().drain(..).collect();
        observability::record_restore_depth(0);
        taken
    }

    /// Number of pending batches
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of pending messages across all batches
    pub fn pending_messages(&self) -> usize {
        self.lock().iter().map(|s| s.batch.len()).sum()
    }
}

fn batch_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("{seq:020}.{BATCH_EXTENSION}"))
}

fn parse_seq(path: &Path) -> Option<u64> {
    if path.extension()? != BATCH_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

fn write_batch(path: &Path, batch: &MessageSet) -> Result<(), RestoreError> {
    let bytes = bincode::serialize(batch)?;
    // rename makes the file appear complete or not at all
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_batch(path: &Path) -> Result<MessageSet, RestoreError> {
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Result of one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub delivered: usize,
    pub requeued: usize,
}

/// Run every pending batch through the delivery path once
pub async fn replay_pass<T>(ctx: &DeliveryContext<T>) -> ReplaySummary
where
    T: Transport + Sync,
{
    run_pass(ctx, None, None).await
}

/// Final pass at shutdown: one attempt per batch, nothing attempted once `cancel` fires
///
/// Batches that are not delivered stay in the store.
pub async fn drain_pass<T>(ctx: &DeliveryContext<T>, cancel: &CancellationToken) -> ReplaySummary
where
    T: Transport + Sync,
{
    run_pass(ctx, Some(1), Some(cancel)).await
}

async fn run_pass<T>(
    ctx: &DeliveryContext<T>,
    max_attempts: Option<u32>,
    cancel: Option<&CancellationToken>,
) -> ReplaySummary
where
    T: Transport + Sync,
{
    let mut summary = ReplaySummary::default();
    for stored in ctx.store.take_all() {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            ctx.store.requeue(stored);
            summary.requeued += 1;
            continue;
        }

        let (seq, batch) = stored.into_parts();
        let mut task = DeliveryTask::new(ctx, batch, Origin::Replay(seq));
        if let Some(max_attempts) = max_attempts {
            task = task.with_max_attempts(max_attempts);
        }
        if let Some(cancel) = cancel {
            task = task.with_cancel(cancel.clone());
        }

        if task.run().await.is_delivered() {
            summary.delivered += 1;
        } else {
            summary.requeued += 1;
        }
    }
    summary
}

/// Spawn the periodic replay loop
///
/// A pass is skipped while the store is empty or no endpoint is eligible.
/// `stop` ends the loop once the current pass is over. `abort` also cuts the
/// pass short: the in-flight call is abandoned and the rest stays stored.
pub fn spawn_replay<T>(
    ctx: DeliveryContext<T>,
    interval: Duration,
    stop: CancellationToken,
    abort: CancellationToken,
) -> JoinHandle<()>
where
    T: Transport + Send + Sync + 'static,
{
    tokio::spawn(async move { replay_loop(ctx, interval, stop, abort).await })
}

#[instrument(name = "restore_replay_loop", skip(ctx, stop, abort))]
async fn replay_loop<T>(ctx: DeliveryContext<T>, interval: Duration, stop: CancellationToken, abort: CancellationToken)
where
    T: Transport + Sync,
{
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                if ctx.store.is_empty() || !ctx.pool.has_eligible() {
                    continue;
                }
                let summary = run_pass(&ctx, None, Some(&abort)).await;
                debug!(
                    delivered = summary.delivered,
                    requeued = summary.requeued,
                    "replay pass finished"
                );
            }
        }
    }

    debug!("replay loop stopped");
}
