//! Dispatcher error types

use thiserror::Error;

/// Why one descriptor could not be turned into a sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkBuildReason {
    #[error("unknown sink type '{0}'")]
    UnknownType(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Another descriptor in the same set already uses this name
    #[error("duplicate sink name")]
    DuplicateName,
}

/// Per-descriptor build failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to build sink '{name}': {reason}")]
pub struct SinkBuildError {
    pub name: String,
    pub reason: SinkBuildReason,
}

impl SinkBuildError {
    pub fn new(name: impl Into<String>, reason: SinkBuildReason) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }

    /// Create an invalid-parameters error
    pub fn invalid_params(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, SinkBuildReason::InvalidParams(message.into()))
    }
}

/// Registry-level failures
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Not a single sink could be built; the previous set stays active
    #[error("no sink could be built ({} descriptor errors)", errors.len())]
    NoSinks { errors: Vec<SinkBuildError> },
}
