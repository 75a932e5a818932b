//! Configuration validation
//!
//! Rules:
//! - at least one of `client` / `collector` present
//! - client: app non-empty, server list non-empty and resolvable,
//!   max_retries bounded, capacities and worker counts > 0
//! - collector: capacities and router workers > 0, at least one sink,
//!   sink names unique and non-empty, routes reference known sinks

use std::collections::HashSet;

use contracts::{ClientConfig, CollectorConfig, ContractError, ShipperBlueprint};

/// Upper bound for per-batch retries
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Validate a ShipperBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    if blueprint.client.is_none() && blueprint.collector.is_none() {
        return Err(ContractError::config_validation(
            "client / collector",
            "at least one of [client] or [collector] must be configured",
        ));
    }
    if let Some(client) = &blueprint.client {
        validate_client(client)?;
    }
    if let Some(collector) = &blueprint.collector {
        validate_collector(collector)?;
    }
    Ok(())
}

fn validate_client(client: &ClientConfig) -> Result<(), ContractError> {
    if client.app.trim().is_empty() {
        return Err(ContractError::config_validation(
            "client.app",
            "app identifier cannot be empty",
        ));
    }
    if client.servers.is_empty() {
        return Err(ContractError::config_validation(
            "client.servers",
            "server list cannot be empty",
        ));
    }
    client.resolve_servers()?;

    if client.max_retries > MAX_RETRIES_LIMIT {
        return Err(ContractError::config_validation(
            "client.max_retries",
            format!(
                "max_retries must be <= {MAX_RETRIES_LIMIT}, got {}",
                client.max_retries
            ),
        ));
    }
    require_positive("client.queue_capacity", client.queue_capacity)?;
    require_positive("client.worker_count", client.worker_count)?;
    require_positive("client.restore_interval_ms", client.restore_interval_ms as usize)?;
    Ok(())
}

fn validate_collector(collector: &CollectorConfig) -> Result<(), ContractError> {
    require_positive("collector.intake_capacity", collector.intake_capacity)?;
    require_positive("collector.router_workers", collector.router_workers)?;

    if collector.sinks.is_empty() {
        return Err(ContractError::config_validation(
            "collector.sinks",
            "at least one sink must be configured",
        ));
    }

    let mut names = HashSet::new();
    for (idx, sink) in collector.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("collector.sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !names.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("collector.sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }

    if let Some(default_sink) = &collector.routing.default_sink {
        if !names.contains(default_sink.as_str()) {
            return Err(ContractError::config_validation(
                "collector.routing.default_sink",
                format!("default sink '{default_sink}' is not a configured sink"),
            ));
        }
    }
    for (app, destinations) in &collector.routing.routes {
        for destination in destinations {
            if !names.contains(destination.as_str()) {
                return Err(ContractError::config_validation(
                    format!("collector.routing.routes.{app}"),
                    format!("route target '{destination}' is not a configured sink"),
                ));
            }
        }
    }
    Ok(())
}

fn require_positive(field: &str, value: usize) -> Result<(), ContractError> {
    if value == 0 {
        return Err(ContractError::config_validation(field, "must be > 0"));
    }
    Ok(())
}
