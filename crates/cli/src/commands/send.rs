//! `send` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use client::{AsyncClient, ClientError, TcpTransport};
use contracts::{ClientConfig, MessageSet, MessageSetBuilder};

use crate::cli::SendArgs;

const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(20);

/// Execute the `send` command
pub async fn run_send(args: &SendArgs) -> Result<()> {
    let config = load_client_config(args)?;

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let client = AsyncClient::with_tcp(&config).context("Client failed to start")?;

    let batches = match &args.file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            ship_lines(&client, &config.app, args.batch_size, file).await?
        }
        None => ship_lines(&client, &config.app, args.batch_size, tokio::io::stdin()).await?,
    };
    info!(batches, "Input exhausted, shutting down client");

    let report = client.shutdown().await;
    if args.json {
        let json = serde_json::json!({
            "sent": report.counters.sent,
            "sent_batches": report.counters.sent_batches,
            "retried": report.counters.retried,
            "restored": report.counters.restored,
            "pending_batches": report.pending_batches,
            "pending_messages": report.pending_messages,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", report.counters);
        if report.pending_batches > 0 {
            println!(
                "{} batches ({} messages) left undelivered",
                report.pending_batches, report.pending_messages
            );
        }
    }

    if report.pending_batches > 0 {
        anyhow::bail!("{} batches could not be delivered", report.pending_batches);
    }
    Ok(())
}

fn load_client_config(args: &SendArgs) -> Result<ClientConfig> {
    let mut config = if args.config.exists() {
        let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
            .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
        blueprint
            .client
            .context("Configuration has no [client] section")?
    } else if !args.servers.is_empty() {
        debug!(config = %args.config.display(), "No config file, using CLI servers");
        ClientConfig::new("logship", Vec::new())
    } else {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    };

    if let Some(ref app) = args.app {
        config.app = app.clone();
    }
    if !args.servers.is_empty() {
        config.servers = args.servers.clone();
    }
    Ok(config)
}

/// Read `input` line by line and enqueue batches of `batch_size`
async fn ship_lines<R>(
    client: &AsyncClient<TcpTransport>,
    app: &str,
    batch_size: usize,
    input: R,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let batch_size = batch_size.max(1);
    let mut lines = BufReader::new(input).lines();
    let mut builder = MessageSetBuilder::new(app);
    let mut batches = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        builder.push(line);
        if builder.len() >= batch_size {
            let full = std::mem::replace(&mut builder, MessageSetBuilder::new(app));
            enqueue(client, full.build()).await?;
            batches += 1;
        }
    }
    if !builder.is_empty() {
        enqueue(client, builder.build()).await?;
        batches += 1;
    }
    Ok(batches)
}

/// Enqueue, waiting while the client queue is full
async fn enqueue(client: &AsyncClient<TcpTransport>, mut batch: MessageSet) -> Result<()> {
    let mut warned = false;
    loop {
        match client.send(batch) {
            Ok(()) => return Ok(()),
            Err(ClientError::QueueFull { batch: rejected, .. }) => {
                if !warned {
                    warn!("Client queue full, waiting");
                    warned = true;
                }
                batch = *rejected;
                tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
            }
            Err(e) => return Err(e).context("Client rejected batch"),
        }
    }
}
