//! Client transport - how a batch reaches one collector

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::{ClientConfig, MessageSet, RpcResult};
use tracing::debug;
use transport::{RpcConnection, TransportError};

/// Delivery of one batch to one collector address
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Send `set` and wait for the collector's verdict
    async fn call(&self, addr: SocketAddr, set: &MessageSet) -> Result<RpcResult, TransportError>;

    /// Release every held connection
    async fn close(&self);
}

/// TCP transport with per-endpoint idle connection reuse
///
/// Connections are checked out for the duration of one call, so concurrent
/// calls to the same endpoint use separate connections.
pub struct TcpTransport {
    connect_timeout: Duration,
    response_timeout: Duration,
    max_connection_age: Duration,
    idle: Mutex<HashMap<SocketAddr, Vec<RpcConnection>>>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, response_timeout: Duration, max_connection_age: Duration) -> Self {
        Self {
            connect_timeout,
            response_timeout,
            max_connection_age,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.connect_timeout(),
            config.response_timeout(),
            config.reconnect_time_interval(),
        )
    }

    /// Number of pooled idle connections
    pub fn idle_connections(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn checkout(&self, addr: SocketAddr) -> Option<RpcConnection> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let connections = idle.get_mut(&addr)?;
        while let Some(conn) = connections.pop() {
            if conn.age() < self.max_connection_age {
                return Some(conn);
            }
            debug!(server = %addr, age = ?conn.age(), "recycling aged connection");
        }
        None
    }

    fn checkin(&self, conn: RpcConnection) {
        if conn.age() >= self.max_connection_age {
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conn.peer())
            .or_default()
            .push(conn);
    }
}

impl Transport for TcpTransport {
    async fn call(&self, addr: SocketAddr, set: &MessageSet) -> Result<RpcResult, TransportError> {
        if let Some(mut conn) = self.checkout(addr) {
            match conn.process(set, self.response_timeout).await {
                Ok(result) => {
                    self.checkin(conn);
                    return Ok(result);
                }
                // A slow server is not retried on a fresh connection
                Err(e @ TransportError::Timeout { .. }) => return Err(e),
                Err(e) => {
                    debug!(server = %addr, error = %e, "pooled connection failed, reconnecting");
                }
            }
        }

        let mut conn = RpcConnection::connect(addr, self.connect_timeout).await?;
        let result = conn.process(set, self.response_timeout).await?;
        self.checkin(conn);
        Ok(result)
    }

    async fn close(&self) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let count: usize = idle.values().map(Vec::len).sum();
        idle.clear();
        debug!(connections = count, "transport closed");
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("idle_connections", &self.idle_connections())
            .finish()
    }
}
