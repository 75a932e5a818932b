//! FileSink - appends one JSON line per message

use contracts::{ContractError, DataSink, Message};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

use super::MessageRecord;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output directory; the sink writes `<base_path>/<name>.log`
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Sink that appends messages to a file
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileSink {
    /// Create the output directory and open the file for appending
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        fs::create_dir_all(&config.base_path)?;
        let path = config.base_path.join(format!("{name}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        debug!(sink = %name, path = %path.display(), "FileSink opened");

        Ok(Self {
            name,
            path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn append(&mut self, message: &Message) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("file sink closed"))?;
        serde_json::to_writer(&mut *writer, &MessageRecord::from(message))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat_line(&self) -> String {
        format!("{} written={}", self.path.display(), self.written)
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, message),
        fields(sink = %self.name, app = %message.app())
    )]
    async fn write(&mut self, message: &Message) -> Result<(), ContractError> {
        self.append(message).map_err(|e| {
            error!(sink = %self.name, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })?;
        self.written += 1;
        Ok(())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(sink = %self.name, written = self.written, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn appends_json_lines_in_order() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            base_path: dir.path().to_path_buf(),
        };

        let mut sink = FileSink::new("events", config).unwrap();
        sink.write(&Message::with_timestamp("web", "first", 1)).await.unwrap();
        sink.write(&Message::with_timestamp("web", "second", 2)).await.unwrap();
        sink.close().await.unwrap();

        let contents = fs::read_to_string(dir.path().join("events.log")).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["payload"], "first");
        assert_eq!(lines[1]["timestamp_ms"], 2);
        assert!(sink.stat_line().ends_with("written=2"));

        assert!(sink.write(&Message::new("web", "late")).await.is_err());
    }
}
