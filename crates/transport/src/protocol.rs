//! Wire vocabulary

use contracts::{MessageSet, RpcResult, ServiceStatus};
use serde::{Deserialize, Serialize};

/// Client -> collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Deliver a batch
    Process(MessageSet),
    Status,
    Name,
    Version,
    /// Ask the collector to stop accepting batches
    Shutdown,
}

/// Collector -> client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Result(RpcResult),
    Status(ServiceStatus),
    Text(String),
    Count(u64),
}

impl Response {
    /// Short description used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Result(_) => "result",
            Response::Status(_) => "status",
            Response::Text(_) => "text",
            Response::Count(_) => "count",
        }
    }
}
