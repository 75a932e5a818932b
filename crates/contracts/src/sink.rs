//! DataSink trait - output interface for routed messages
//!
//! Defines the abstract interface for Sinks.

use crate::{ContractError, Message};

/// Data output trait
///
/// All sink implementations must implement this trait. A sink is owned by a
/// single worker, so methods take `&mut self`.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Human-readable one-line summary, e.g. counters or target
    fn stat_line(&self) -> String;

    /// Write one message
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, message: &Message) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
