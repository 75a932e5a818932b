//! CollectorService - the RPC-facing side of the collector

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{MessageSet, RpcResult, ServiceStatus};
use tracing::{debug, info};
use transport::MessageService;

use crate::intake::{IntakeError, IntakeQueue};

/// Admits batches into the intake queue
pub struct CollectorService {
    name: String,
    intake: Arc<IntakeQueue>,
    alive: AtomicBool,
}

impl CollectorService {
    pub fn new(name: impl Into<String>, intake: Arc<IntakeQueue>) -> Self {
        Self {
            name: name.into(),
            intake,
            alive: AtomicBool::new(true),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl MessageService for CollectorService {
    fn process(&self, set: MessageSet) -> RpcResult {
        if !self.is_alive() {
            return RpcResult::try_later("collector shutting down");
        }
        let batch_id = set.id();
        match self.intake.offer(set) {
            Ok(()) => RpcResult::ok(),
            Err(IntakeError::Full) => {
                debug!(%batch_id, "intake full, asking client to retry");
                RpcResult::try_later("intake queue full")
            }
            Err(IntakeError::Closed) => RpcResult::try_later("collector shutting down"),
        }
    }

    fn status(&self) -> ServiceStatus {
        if self.is_alive() {
            ServiceStatus::Alive
        } else {
            ServiceStatus::Dead
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn shutdown(&self) -> u64 {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!(collector = %self.name, "intake stopped");
        }
        self.intake.close();
        self.intake.depth() as u64
    }
}
