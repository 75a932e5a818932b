//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 根据描述符构建命名 sinks (`SinkFactory`, `SinkRegistry`)
//! - 按 app 将消息路由到目标 sinks (`Router`)
//! - 隔离慢 sink，不阻塞主链路

pub mod error;
pub mod factory;
pub mod handle;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod sinks;

pub use contracts::{DataSink, Message, MessageSet};
pub use error::{RegistryError, SinkBuildError, SinkBuildReason};
pub use factory::SinkFactory;
pub use handle::{SinkHandle, SinkRejected};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use registry::{BuildReport, SinkRegistry, SinkSet};
pub use router::{DispatchReport, Router, RouterStats, RouterStatsSnapshot, RoutingTable};
pub use sinks::{FileSink, LogSink, NetworkSink};
