//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `ShipperBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("logship.toml")).unwrap();
//! if let Some(client) = &blueprint.client {
//!     println!("Servers: {:?}", client.servers);
//! }
//! ```

mod parser;
mod validator;

pub use contracts::ShipperBlueprint;
pub use parser::ConfigFormat;
pub use validator::MAX_RETRIES_LIMIT;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ShipperBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ShipperBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already constructed blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize ShipperBlueprint to TOML string
    pub fn to_toml(blueprint: &ShipperBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ShipperBlueprint to JSON string
    pub fn to_json(blueprint: &ShipperBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ShipperBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[client]
app = "web"
servers = ["127.0.0.1:7101"]

[collector]
rpc_addr = "127.0.0.1:7101"

[[collector.sinks]]
name = "default"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.client.unwrap().app, "web");
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        let (c1, c2) = (bp.collector.unwrap(), bp2.collector.unwrap());
        assert_eq!(c1.rpc_addr, c2.rpc_addr);
        assert_eq!(c1.sinks, c2.sinks);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.client.unwrap().servers, bp2.client.unwrap().servers);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        // Default sink points at a sink that does not exist
        let content = r#"
[collector]
[collector.routing]
default_sink = "nowhere"

[[collector.sinks]]
name = "log"
sink_type = "log"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("nowhere"));
    }

    #[test]
    fn test_unknown_extension() {
        let result = ConfigLoader::load_from_path(Path::new("logship.yaml"));
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }
}
