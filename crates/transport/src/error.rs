//! Transport error types

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to a peer
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding / decoding failure
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Frame exceeds the configured bound
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Connect or response deadline elapsed
    #[error("{operation} to {peer} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        peer: SocketAddr,
        timeout: Duration,
    },

    /// Peer closed the connection mid-call
    #[error("connection to {peer} closed")]
    ConnectionClosed { peer: SocketAddr },

    /// Peer answered with the wrong response kind
    #[error("unexpected response from {peer}: {response}")]
    UnexpectedResponse { peer: SocketAddr, response: String },
}
