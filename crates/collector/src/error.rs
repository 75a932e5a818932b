//! Collector error types

use thiserror::Error;

/// Fatal startup errors
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid listener address
    #[error("config error: {0}")]
    Config(#[from] contracts::ContractError),

    /// No sink could be built
    #[error("sink registry: {0}")]
    Registry(#[from] dispatcher::RegistryError),

    /// RPC listener could not be bound
    #[error("rpc listener: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
