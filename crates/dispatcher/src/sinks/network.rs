//! NetworkSink - UDP fire-and-forget forwarding, one datagram per message

use contracts::{ContractError, DataSink, Message};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, instrument, warn};

use super::MessageRecord;

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Max datagram size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = match params.get("max_packet_size") {
            Some(raw) => raw
                .parse()
                .map_err(|e| format!("invalid max_packet_size '{}': {}", raw, e))?,
            None => 65000,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Sink that sends messages over UDP
///
/// The socket is bound on first write, so building the sink never blocks.
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    sent: u64,
    closed: bool,
}

impl NetworkSink {
    pub fn new(name: impl Into<String>, config: NetworkSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            socket: None,
            sent: 0,
            closed: false,
        }
    }

    /// Create from params (for factory)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Result<Self, String> {
        Ok(Self::new(name, NetworkSinkConfig::from_params(params)?))
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ContractError> {
        let data = match self.config.format {
            NetworkFormat::Json => serde_json::to_vec(&MessageRecord::from(message))
                .map_err(|e| ContractError::sink_write(&self.name, format!("json error: {}", e)))?,
            NetworkFormat::Bincode => bincode::serialize(message)
                .map_err(|e| ContractError::sink_write(&self.name, format!("bincode error: {}", e)))?,
        };

        if data.len() > self.config.max_packet_size {
            warn!(
                sink = %self.name,
                size = data.len(),
                max = self.config.max_packet_size,
                "Packet too large, dropped"
            );
            return Err(ContractError::sink_write(&self.name, "packet exceeds max_packet_size"));
        }
        Ok(data)
    }

    async fn socket(&mut self) -> Result<&UdpSocket, ContractError> {
        if self.closed {
            return Err(ContractError::sink_write(&self.name, "sink closed"));
        }
        if self.socket.is_none() {
            let local: SocketAddr = if self.config.addr.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let socket = UdpSocket::bind(local)
                .await
                .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;
            socket
                .connect(self.config.addr)
                .await
                .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;
            debug!(sink = %self.name, target = %self.config.addr, "NetworkSink connected");
            self.socket = Some(socket);
        }
        self.socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not connected"))
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat_line(&self) -> String {
        format!("udp://{} sent={}", self.config.addr, self.sent)
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, message),
        fields(sink = %self.name, app = %message.app())
    )]
    async fn write(&mut self, message: &Message) -> Result<(), ContractError> {
        let data = self.serialize(message)?;
        let name = self.name.clone();
        let socket = self.socket().await?;
        match socket.send(&data).await {
            Ok(bytes) => debug!(sink = %name, bytes, "Sent"),
            // UDP is best-effort
            Err(e) => warn!(sink = %name, error = %e, "UDP send failed"),
        }
        self.sent += 1;
        Ok(())
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        self.closed = true;
        debug!(sink = %self.name, sent = self.sent, "NetworkSink closed");
        Ok(())
    }
}
