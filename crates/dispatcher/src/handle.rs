//! SinkHandle - owns a sink behind an isolated queue and worker task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use contracts::{DataSink, Message};

use crate::metrics::SinkMetrics;

/// Why a message was not accepted by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkRejected {
    /// Queue at capacity (transient)
    Full,
    Closed,
}

impl SinkRejected {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkRejected::Full => "full",
            SinkRejected::Closed => "closed",
        }
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Message>,
    metrics: Arc<SinkMetrics>,
    /// Last stat line reported by the sink
    stat: Arc<Mutex<String>>,
    open: AtomicBool,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: DataSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());
        let stat = Arc::new(Mutex::new(sink.stat_line()));
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(sink_worker(
            sink,
            rx,
            Arc::clone(&metrics),
            Arc::clone(&stat),
            cancel.clone(),
        ));

        Self {
            name,
            tx,
            metrics,
            stat,
            open: AtomicBool::new(true),
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Stat line as of the last completed write
    pub fn stat_line(&self) -> String {
        self.stat.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `name:stat_line open|closed`
    pub fn status_line(&self) -> String {
        let state = if self.is_open() { "open" } else { "closed" };
        format!("{}:{} {}", self.name, self.stat_line(), state)
    }

    /// Queue a message without waiting
    pub fn try_write(&self, message: Message) -> Result<(), SinkRejected> {
        if !self.is_open() {
            self.metrics.inc_rejected_closed();
            return Err(SinkRejected::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => {
                self.metrics.inc_enqueued();
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.inc_rejected_full();
                Err(SinkRejected::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.inc_rejected_closed();
                Err(SinkRejected::Closed)
            }
        }
    }

    /// Stop accepting, drain the queue, flush and close the sink
    ///
    /// Safe to call more than once; later calls return immediately.
    #[instrument(name = "sink_handle_close", skip(self), fields(sink = %self.name))]
    pub async fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
            }
            debug!(sink = %self.name, "SinkHandle closed");
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

async fn write_one<S: DataSink>(
    sink: &mut S,
    message: &Message,
    metrics: &SinkMetrics,
    stat: &Mutex<String>,
) {
    match sink.write(message).await {
        Ok(()) => metrics.inc_written(),
        Err(e) => {
            metrics.inc_write_failures();
            error!(sink = %sink.name(), app = %message.app(), error = %e, "Write failed");
        }
    }
    *stat.lock().unwrap_or_else(PoisonError::into_inner) = sink.stat_line();
}

/// Worker task that consumes messages and writes them to the sink
#[instrument(
    name = "sink_worker_loop",
    skip_all,
    fields(sink = %sink.name())
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Message>,
    metrics: Arc<SinkMetrics>,
    stat: Arc<Mutex<String>>,
    cancel: CancellationToken,
) {
    debug!("Sink worker started");

    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(message) => {
                    metrics.set_queue_len(rx.len());
                    write_one(&mut sink, &message, &metrics, &stat).await;
                }
                None => break,
            },
            _ = cancel.cancelled() => break,
        }
    }

    // Drain what was accepted before close
    rx.close();
    while let Some(message) = rx.recv().await {
        write_one(&mut sink, &message, &metrics, &stat).await;
    }
    metrics.set_queue_len(0);

    if let Err(e) = sink.flush().await {
        error!(error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "Close failed on shutdown");
    }
    *stat.lock().unwrap_or_else(PoisonError::into_inner) = sink.stat_line();

    debug!("Sink worker stopped");
}
