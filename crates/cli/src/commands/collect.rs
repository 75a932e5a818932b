//! `collect` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use collector::Collector;
use dispatcher::SinkFactory;

use crate::cli::CollectArgs;
use crate::commands::shutdown_signal;

/// Execute the `collect` command
pub async fn run_collect(args: &CollectArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let mut config = blueprint
        .collector
        .context("Configuration has no [collector] section")?;

    // Apply CLI overrides
    if let Some(ref addr) = args.rpc_addr {
        info!(addr = %addr, "Overriding RPC address from CLI");
        config.rpc_addr = addr.clone();
    }
    if let Some(ref addr) = args.status_addr {
        info!(addr = %addr, "Overriding status address from CLI");
        config.status_addr = Some(addr.clone());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let collector = Collector::start(&config, SinkFactory::default())
        .await
        .context("Collector failed to start")?;
    for error in &collector.build_report().errors {
        warn!(sink = %error.name, reason = %error.reason, "Sink skipped");
    }

    let timeout = async {
        if args.timeout == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(args.timeout)).await;
        }
    };

    tokio::select! {
        _ = shutdown_signal() => warn!("Received shutdown signal, stopping collector..."),
        _ = timeout => info!(secs = args.timeout, "Timeout reached, stopping collector..."),
    }

    let report = collector.shutdown().await;
    println!("\n=== Collector Summary ===\n");
    println!("  Batches:   {}", report.router.batches);
    println!("  Messages:  {}", report.router.messages);
    println!("  Routed:    {}", report.router.routed);
    println!("  Unrouted:  {}", report.router.unrouted);
    println!("  Failures:  {}", report.router.sink_failures);
    println!("\nSinks:");
    for line in collector.registry().status_snapshot() {
        println!("  - {}", line);
    }
    println!();

    info!("Collector finished");
    Ok(())
}
