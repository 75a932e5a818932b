//! # Client
//!
//! Producer side of the pipeline.
//!
//! Responsibilities:
//! - accept `MessageSet`s without blocking the caller
//! - pick a collector from the `ServerPool` and deliver with bounded retries
//! - spill undeliverable batches to the `RestoreStore` and replay them later

pub mod client;
pub mod counters;
pub mod delivery;
pub mod error;
#[cfg(test)]
mod mock;
pub mod pool;
pub mod restore;
pub mod transport;

pub use client::{AsyncClient, ShutdownReport};
pub use counters::{ClientCounters, CounterSnapshot};
pub use delivery::{DeliveryContext, DeliveryOutcome, DeliveryTask, Origin};
pub use error::{ClientError, PoolError, RestoreError};
pub use pool::{
    Endpoint, EndpointSnapshot, Health, Ordered, PoolPolicy, RoundRobin, SelectionStrategy,
    ServerPool,
};
pub use restore::{drain_pass, replay_pass, spawn_replay, ReplaySummary, RestoreStore, StoredBatch};
pub use transport::{LocalTransport, TcpTransport, Transport};
