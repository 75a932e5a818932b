//! RPC result vocabulary shared by client and collector.

use serde::{Deserialize, Serialize};

/// Outcome of one delivery attempt
///
/// Closed set: anything other than `Ok` is a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// Batch accepted
    Ok,
    /// Server busy (backpressure), retry later
    TryLater,
    /// Non-retryable on this server; another server may accept it
    OtherError,
}

impl ResultCode {
    pub fn is_ok(self) -> bool {
        matches!(self, ResultCode::Ok)
    }

    /// Short label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::TryLater => "try_later",
            ResultCode::OtherError => "other_error",
        }
    }
}

/// Response to a `process` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResult {
    pub code: ResultCode,
    pub message: Option<String>,
}

impl RpcResult {
    pub fn ok() -> Self {
        Self {
            code: ResultCode::Ok,
            message: None,
        }
    }

    pub fn try_later(message: impl Into<String>) -> Self {
        Self {
            code: ResultCode::TryLater,
            message: Some(message.into()),
        }
    }

    pub fn other_error(message: impl Into<String>) -> Self {
        Self {
            code: ResultCode::OtherError,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

/// Liveness reported by a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Alive,
    Dead,
}
