//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{ClientConfig, CollectorConfig, ShipperBlueprint};

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    client: Option<ClientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collector: Option<CollectorInfo>,
}

#[derive(Serialize)]
struct ClientInfo {
    app: String,
    servers: Vec<String>,
    selection: String,
    max_retries: u32,
    queue_capacity: usize,
    worker_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    restore_dir: Option<String>,
}

#[derive(Serialize)]
struct CollectorInfo {
    name: String,
    rpc_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_addr: Option<String>,
    intake_capacity: usize,
    router_workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_sink: Option<String>,
    routes: HashMap<String, Vec<String>>,
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &ShipperBlueprint, args: &InfoArgs) -> ConfigInfo {
    let client = blueprint.client.as_ref().map(|c| ClientInfo {
        app: c.app.clone(),
        servers: c.servers.clone(),
        selection: format!("{:?}", c.selection),
        max_retries: c.max_retries,
        queue_capacity: c.queue_capacity,
        worker_count: c.worker_count,
        restore_dir: c.restore_dir.as_ref().map(|p| p.display().to_string()),
    });

    let collector = blueprint.collector.as_ref().map(|c| CollectorInfo {
        name: c.name.clone(),
        rpc_addr: c.rpc_addr.clone(),
        status_addr: c.status_addr.clone(),
        intake_capacity: c.intake_capacity,
        router_workers: c.router_workers,
        default_sink: c.routing.default_sink.clone(),
        routes: c.routing.routes.clone(),
        sinks: c
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: s.sink_type.clone(),
                queue_capacity: s.queue_capacity,
                params: if args.sinks { s.params.clone() } else { HashMap::new() },
            })
            .collect(),
    });

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        client,
        collector,
    }
}

fn print_config_info(blueprint: &ShipperBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  logship Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Version: {:?}", blueprint.version);

    match &blueprint.client {
        Some(client) => print_client(client),
        None => println!("\n📤 Client: (not configured)"),
    }
    match &blueprint.collector {
        Some(collector) => print_collector(collector, args),
        None => println!("\n📥 Collector: (not configured)"),
    }

    println!();
}

fn print_client(client: &ClientConfig) {
    println!("\n📤 Client");
    println!("   ├─ App: {}", client.app);
    println!("   ├─ Selection: {:?}", client.selection);
    println!("   ├─ Max retries: {}", client.max_retries);
    println!(
        "   ├─ Queue: {} batches, {} workers",
        client.queue_capacity, client.worker_count
    );
    match &client.restore_dir {
        Some(dir) => println!("   ├─ Restore dir: {}", dir.display()),
        None => println!("   ├─ Restore dir: (memory only)"),
    }
    println!("   └─ Servers ({})", client.servers.len());
    for (i, server) in client.servers.iter().enumerate() {
        let prefix = if i == client.servers.len() - 1 { "└─" } else { "├─" };
        println!("      {} {}", prefix, server);
    }
}

fn print_collector(collector: &CollectorConfig, args: &InfoArgs) {
    println!("\n📥 Collector");
    println!("   ├─ Name: {}", collector.name);
    println!("   ├─ RPC: {}", collector.rpc_addr);
    match &collector.status_addr {
        Some(addr) => println!("   ├─ Status: {}", addr),
        None => println!("   ├─ Status: (disabled)"),
    }
    println!(
        "   ├─ Intake: {} batches, {} routers",
        collector.intake_capacity, collector.router_workers
    );
    match &collector.routing.default_sink {
        Some(sink) => println!("   ├─ Default sink: {}", sink),
        None => println!("   ├─ Default sink: (none)"),
    }
    for (app, sinks) in &collector.routing.routes {
        println!("   ├─ Route {} -> {:?}", app, sinks);
    }

    println!("   └─ Sinks ({})", collector.sinks.len());
    for (i, sink) in collector.sinks.iter().enumerate() {
        let is_last = i == collector.sinks.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        println!("      {} {} ({})", prefix, sink.name, sink.sink_type);
        if args.sinks {
            let child_prefix = if is_last { "   " } else { "│  " };
            let mut params: Vec<_> = sink.params.iter().collect();
            params.sort();
            for (key, value) in params {
                println!("      {}   {} = {}", child_prefix, key, value);
            }
        }
    }
}
