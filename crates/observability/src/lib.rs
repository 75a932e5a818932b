//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式，支持 `RUST_LOG`)
//! - Prometheus 指标导出 (可选 HTTP 监听)
//! - 客户端与 collector 共用的指标记录函数
//!
//! ## 使用示例
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::default())?;
//! observability::record_batch_sent(batch.len());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::metrics::{
    record_batch_retried, record_batch_restored, record_batch_sent, record_intake_depth,
    record_intake_offer, record_message_routed, record_message_unrouted, record_restore_depth,
    record_sink_failure,
};

/// Initialize with defaults (JSON logs, metrics on port 9000)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Observability settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus listener port (None disables the exporter)
    pub metrics_port: Option<u16>,
    /// Filter used when `RUST_LOG` is not set
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(9000),
            default_log_level: "info".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON
    #[default]
    Json,
    Pretty,
    /// Single line per event
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{other}' (expected json, pretty or compact)")),
        }
    }
}

/// Install the tracing subscriber and, if configured, the Prometheus exporter
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install only the Prometheus exporter
///
/// For callers whose tracing subscriber is already set up.
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, Some(9000));
        assert_eq!(config.default_log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
