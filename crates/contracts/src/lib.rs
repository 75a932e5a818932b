//! # Contracts
//!
//! Frozen interface contracts shared by the client, the collector and the sinks.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Delivery model
//! - A `MessageSet` is the unit of transfer, retry and restore; it is never split
//! - Any `ResultCode` other than `Ok` is a failed attempt for that batch
//! - Delivery is at-least-once; ordering holds only inside a batch

mod blueprint;
mod error;
mod message;
mod result;
mod sink;

pub use blueprint::*;
pub use error::*;
pub use message::{Message, MessageSet, MessageSetBuilder};
pub use result::{ResultCode, RpcResult, ServiceStatus};
pub use sink::*;
