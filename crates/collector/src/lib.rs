//! # Collector
//!
//! Server side of the pipeline: RPC intake, bounded queue, routing to sinks,
//! and the monitoring HTTP endpoints.

pub mod collector;
pub mod error;
pub mod intake;
pub mod service;
pub mod status;

pub use collector::{Collector, CollectorReport};
pub use error::CollectorError;
pub use intake::{IntakeError, IntakeQueue, IntakeStats};
pub use service::CollectorService;
pub use status::{serve_status, status_router, StatusState};
