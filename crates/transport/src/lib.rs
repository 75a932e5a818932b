//! # Transport
//!
//! RPC boundary between clients and collectors.
//!
//! - Frames: `u32` big-endian length prefix + bincode body
//! - `Request` / `Response`: the wire vocabulary
//! - `MessageService`: what a collector exposes
//! - `RpcServer`: accept loop, one task per connection
//! - `RpcConnection`: client side of one connection

mod connection;
mod error;
mod frame;
mod protocol;
mod server;
mod service;

pub use connection::RpcConnection;
pub use error::TransportError;
pub use frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
pub use protocol::{Request, Response};
pub use server::RpcServer;
pub use service::{handle_request, MessageService};
