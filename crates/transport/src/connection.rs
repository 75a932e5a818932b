//! Client side of one RPC connection

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use contracts::{MessageSet, RpcResult};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::{read_frame, write_frame, Request, Response, TransportError};

/// One open connection to a collector
///
/// Calls are strictly sequential: a request is written, then its response is read.
pub struct RpcConnection {
    peer: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    opened_at: Instant,
    max_frame_bytes: usize,
}

impl RpcConnection {
    /// Open a connection, bounded by `timeout`
    pub async fn connect(peer: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "connect",
                peer,
                timeout,
            })??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            peer,
            reader: BufReader::new(read_half),
            writer: write_half,
            opened_at: Instant::now(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Time since the connection was opened
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Send `request` and wait for its response, bounded by `timeout`
    pub async fn call(&mut self, request: Request, timeout: Duration) -> Result<Response, TransportError> {
        let peer = self.peer;
        let exchange = async {
            write_frame(&mut self.writer, &request, self.max_frame_bytes).await?;
            read_frame::<_, Response>(&mut self.reader, self.max_frame_bytes)
                .await?
                .ok_or(TransportError::ConnectionClosed { peer })
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "call",
                peer,
                timeout,
            })?
    }

    /// Deliver one batch
    pub async fn process(&mut self, set: &MessageSet, timeout: Duration) -> Result<RpcResult, TransportError> {
        match self.call(Request::Process(set.clone()), timeout).await? {
            Response::Result(result) => Ok(result),
            other => Err(TransportError::UnexpectedResponse {
                peer: self.peer,
                response: other.kind().to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("peer", &self.peer)
            .field("age", &self.age())
            .finish()
    }
}
