//! Client error types

use contracts::{ContractError, MessageSet};
use thiserror::Error;

/// Errors returned to callers of `AsyncClient`
///
/// Rejected batches are handed back so the caller keeps ownership.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Internal queue at capacity
    #[error("delivery queue full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
        batch: Box<MessageSet>,
    },

    /// Shutdown already started
    #[error("client is shutting down")]
    ShuttingDown { batch: Box<MessageSet> },

    /// Server pool could not be built
    #[error("server pool: {0}")]
    Pool(#[from] PoolError),

    /// Restore store could not be opened
    #[error("restore store: {0}")]
    Restore(#[from] RestoreError),
}

impl ClientError {
    /// Recover the rejected batch, if any
    pub fn into_batch(self) -> Option<MessageSet> {
        match self {
            ClientError::QueueFull { batch, .. } | ClientError::ShuttingDown { batch } => Some(*batch),
            _ => None,
        }
    }
}

/// Server pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Empty server list
    #[error("no servers configured")]
    NoServers,

    /// Unparsable server entry
    #[error("{0}")]
    InvalidAddress(#[from] ContractError),
}

/// Restore store errors
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}
