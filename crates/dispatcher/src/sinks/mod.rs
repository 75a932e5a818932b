//! Sink implementations
//!
//! Contains LogSink, FileSink, and NetworkSink.

mod file;
mod log;
mod network;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig};

use contracts::Message;
use serde::Serialize;

/// JSON shape of a message; payload decoded as lossy UTF-8
#[derive(Debug, Serialize)]
struct MessageRecord<'a> {
    app: &'a str,
    timestamp_ms: i64,
    payload: std::borrow::Cow<'a, str>,
}

impl<'a> From<&'a Message> for MessageRecord<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            app: message.app(),
            timestamp_ms: message.timestamp_ms(),
            payload: String::from_utf8_lossy(message.payload()),
        }
    }
}
