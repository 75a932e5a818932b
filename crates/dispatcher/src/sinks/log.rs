//! LogSink - logs each message via tracing

use contracts::{ContractError, DataSink, Message};
use tracing::{info, instrument};

/// Payload bytes included in the log line
const PREVIEW_BYTES: usize = 256;

/// Sink that logs messages for debugging
pub struct LogSink {
    name: String,
    logged: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logged: 0,
        }
    }

    fn log_message(&self, message: &Message) {
        let payload = message.payload();
        let preview = &payload[..payload.len().min(PREVIEW_BYTES)];

        info!(
            sink = %self.name,
            app = %message.app(),
            timestamp_ms = message.timestamp_ms(),
            bytes = payload.len(),
            payload = %String::from_utf8_lossy(preview),
            "Message received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat_line(&self) -> String {
        format!("logged={}", self.logged)
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, message),
        fields(sink = %self.name, app = %message.app())
    )]
    async fn write(&mut self, message: &Message) -> Result<(), ContractError> {
        self.log_message(message);
        self.logged += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, logged = self.logged, "LogSink closed");
        Ok(())
    }
}
