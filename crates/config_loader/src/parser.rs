//! Configuration parsing
//!
//! Supports TOML (primary) and JSON formats.

use contracts::{ContractError, ShipperBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<ShipperBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<ShipperBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<ShipperBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[client]
app = "web"
servers = ["127.0.0.1:7101", "127.0.0.1:7102"]
max_retries = 3

[collector]
rpc_addr = "127.0.0.1:7101"
intake_capacity = 64

[collector.routing]
default_sink = "default"

[collector.routing.routes]
billing = ["audit"]

[[collector.sinks]]
name = "default"
sink_type = "log"

[[collector.sinks]]
name = "audit"
sink_type = "file"
[collector.sinks.params]
base_path = "/tmp/logship"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        let client = bp.client.unwrap();
        assert_eq!(client.servers.len(), 2);
        assert_eq!(client.max_retries, 3);
        let collector = bp.collector.unwrap();
        assert_eq!(collector.intake_capacity, 64);
        assert_eq!(collector.sinks.len(), 2);
        assert_eq!(collector.sinks[1].params["base_path"], "/tmp/logship");
        assert_eq!(collector.routing.routes["billing"], vec!["audit".to_string()]);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "collector": {
                "sinks": [
                    { "name": "default", "sink_type": "log", "queue_capacity": 10 }
                ]
            }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert!(result.unwrap().client.is_none());
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
