//! ShipperBlueprint - Config Loader output
//!
//! Describes a complete deployment: the client side (servers, reconnect and
//! retry policy, restore store) and the collector side (listeners, intake
//! capacity, routing, sinks). Either side may be absent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::ContractError;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete deployment blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipperBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Producer-side settings
    #[serde(default)]
    pub client: Option<ClientConfig>,

    /// Collector-side settings
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
}

/// Endpoint selection strategy for the server pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategyKind {
    /// Rotate over eligible endpoints
    #[default]
    RoundRobin,
    /// Prefer endpoints in configured order
    Ordered,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Application identifier stamped on outgoing batches
    pub app: String,

    /// Collector addresses (`host:port`)
    pub servers: Vec<String>,

    /// Endpoint selection strategy
    #[serde(default)]
    pub selection: SelectionStrategyKind,

    /// Retries per batch after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bound of the in-memory delivery queue (batches)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent delivery workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Cool-down after a failure before an endpoint may be picked again
    #[serde(default = "default_minimum_reconnect_interval_ms")]
    pub minimum_reconnect_interval_ms: u64,

    /// Minimum spacing between attempts on an unhealthy endpoint
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Suspect endpoints without a success for this long are demoted to down;
    /// pooled connections older than this are recycled
    #[serde(default = "default_reconnect_time_interval_ms")]
    pub reconnect_time_interval_ms: u64,

    /// Replay period of the restore store
    #[serde(default = "default_restore_interval_ms")]
    pub restore_interval_ms: u64,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-call response timeout
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Upper bound for waiting on workers and the final restore pass
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Spill directory for the restore store (memory when absent)
    #[serde(default)]
    pub restore_dir: Option<PathBuf>,
}

fn default_max_retries() -> u32 {
    5
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_worker_count() -> usize {
    4
}

fn default_minimum_reconnect_interval_ms() -> u64 {
    1_000
}

fn default_reconnect_interval_ms() -> u64 {
    1_000
}

fn default_reconnect_time_interval_ms() -> u64 {
    30_000
}

fn default_restore_interval_ms() -> u64 {
    1_000
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_response_timeout_ms() -> u64 {
    5_000
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

impl ClientConfig {
    /// Client configuration with default policy values
    pub fn new(app: impl Into<String>, servers: Vec<String>) -> Self {
        Self {
            app: app.into(),
            servers,
            selection: SelectionStrategyKind::default(),
            max_retries: default_max_retries(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            minimum_reconnect_interval_ms: default_minimum_reconnect_interval_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_time_interval_ms: default_reconnect_time_interval_ms(),
            restore_interval_ms: default_restore_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            restore_dir: None,
        }
    }

    pub fn minimum_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.minimum_reconnect_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn reconnect_time_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_time_interval_ms)
    }

    pub fn restore_interval(&self) -> Duration {
        Duration::from_millis(self.restore_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Resolve every configured server to a socket address
    ///
    /// Each entry contributes its first resolved address.
    pub fn resolve_servers(&self) -> Result<Vec<SocketAddr>, ContractError> {
        self.servers
            .iter()
            .map(|server| resolve_address(server))
            .collect()
    }
}

/// Resolve `host:port` to its first socket address
pub fn resolve_address(address: &str) -> Result<SocketAddr, ContractError> {
    address
        .to_socket_addrs()
        .map_err(|e| ContractError::invalid_address(address, e.to_string()))?
        .next()
        .ok_or_else(|| ContractError::invalid_address(address, "no address resolved"))
}

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Service name reported over RPC
    #[serde(default = "default_collector_name")]
    pub name: String,

    /// RPC listener address
    #[serde(default = "default_rpc_addr")]
    pub rpc_addr: String,

    /// Monitoring HTTP listener address (disabled when absent)
    #[serde(default = "default_status_addr")]
    pub status_addr: Option<String>,

    /// Bound of the intake queue (batches)
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    /// Router tasks consuming the intake queue
    #[serde(default = "default_router_workers")]
    pub router_workers: usize,

    /// Routing policy
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Sink descriptors, in registration order
    #[serde(default)]
    pub sinks: Vec<SinkDescriptor>,
}

fn default_collector_name() -> String {
    "logship-collector".to_string()
}

fn default_rpc_addr() -> String {
    "0.0.0.0:7101".to_string()
}

fn default_status_addr() -> Option<String> {
    Some("0.0.0.0:7103".to_string())
}

fn default_intake_capacity() -> usize {
    1_000
}

fn default_router_workers() -> usize {
    1
}

impl CollectorConfig {
    /// Collector configuration with default listeners and the given sinks
    pub fn new(sinks: Vec<SinkDescriptor>) -> Self {
        Self {
            name: default_collector_name(),
            rpc_addr: default_rpc_addr(),
            status_addr: default_status_addr(),
            intake_capacity: default_intake_capacity(),
            router_workers: default_router_workers(),
            routing: RoutingConfig::default(),
            sinks,
        }
    }
}

/// Message routing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Sink receiving messages whose app has no explicit route
    #[serde(default = "default_sink_name")]
    pub default_sink: Option<String>,

    /// App name -> destination sink names
    #[serde(default)]
    pub routes: HashMap<String, Vec<String>>,
}

fn default_sink_name() -> Option<String> {
    Some("default".to_string())
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_sink: default_sink_name(),
            routes: HashMap::new(),
        }
    }
}

/// Sink descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkDescriptor {
    /// Sink name (unique key)
    pub name: String,

    /// Sink type, resolved by the sink factory
    pub sink_type: String,

    /// Queue capacity
    #[serde(default = "default_sink_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_sink_queue_capacity() -> usize {
    100
}

impl SinkDescriptor {
    /// Descriptor with default queue capacity and no parameters
    pub fn new(name: impl Into<String>, sink_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_type: sink_type.into(),
            queue_capacity: default_sink_queue_capacity(),
            params: HashMap::new(),
        }
    }

    /// Add a type-specific parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}
