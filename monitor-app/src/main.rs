// nodelink monitor -- watches the links of one repeater node and prints
// every change notification, or prints a one-off status table.
//
// Usage:
//   nodelink-monitor --host 192.168.1.50 --username admin --node 1999
//   nodelink-monitor --host 192.168.1.50 --node 1999 --mode poll --poll-interval 10
//   nodelink-monitor --host 192.168.1.50 --node 1999 --json watch
//   nodelink-monitor --host 192.168.1.50 --node 1999 status
//
// The management interface secret is read from --secret or the
// NODELINK_AMI_SECRET environment variable. Log output goes to stderr and
// honours RUST_LOG; notifications go to stdout.

mod output;
mod persist;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use nodelink::client::{Connector, ConnectorBuilder};
use nodelink::state::{Collaborators, LinkTracker, Poller, StateConfig, StateManager, UpdateMode};
use nodelink::{BroadcastNotifier, NoLookup, Notification};

use crate::output::{notification_json, notification_text, status_table};
use crate::persist::LoggingPersister;

/// Capacity of the notification broadcast channel.
const NOTIFICATION_CAPACITY: usize = 256;

/// How long to wait for the first successful login.
const READY_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// nodelink monitor -- live link and transmit notifications for a node.
#[derive(Parser)]
#[command(name = "nodelink-monitor", version, about)]
struct Cli {
    /// Controller host name or address.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Management interface TCP port.
    #[arg(long, default_value_t = nodelink::client::config::DEFAULT_PORT)]
    port: u16,

    /// Management interface user name.
    #[arg(long, default_value = "admin")]
    username: String,

    /// Management interface secret.
    #[arg(long, env = "NODELINK_AMI_SECRET", hide_env_values = true)]
    secret: String,

    /// Local node number to monitor.
    #[arg(long)]
    node: u32,

    /// Update source: events, poll or hybrid.
    #[arg(long, default_value = "hybrid")]
    mode: UpdateMode,

    /// Seconds between snapshot polls.
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// Milliseconds to collect transmit edges before notifying.
    #[arg(long, default_value_t = 100)]
    batch_window: u64,

    /// Initial reconnect delay in milliseconds.
    #[arg(long, default_value_t = 1000)]
    min_backoff: u64,

    /// Maximum reconnect delay in milliseconds.
    #[arg(long, default_value_t = 60_000)]
    max_backoff: u64,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print each notification as one JSON line.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Print notifications until interrupted (the default).
    Watch,
    /// Poll once, print the link table and exit.
    Status,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let connector = ConnectorBuilder::new()
        .host(&cli.host)
        .port(cli.port)
        .credentials(&cli.username, &cli.secret)
        .min_backoff(Duration::from_millis(cli.min_backoff))
        .max_backoff(Duration::from_millis(cli.max_backoff))
        .start()
        .context("invalid connection settings")?;

    let result = match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => cmd_watch(&cli, &connector).await,
        Command::Status => cmd_status(&cli, &connector).await,
    };

    connector.shutdown().await;
    result
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_watch(cli: &Cli, connector: &Connector) -> Result<()> {
    let config = StateConfig::new(cli.node)
        .update_mode(cli.mode)
        .poll_interval(Duration::from_secs(cli.poll_interval))
        .batch_window(Duration::from_millis(cli.batch_window));

    let notifier = Arc::new(BroadcastNotifier::new(NOTIFICATION_CAPACITY));
    let rx = notifier.subscribe();
    let collaborators = Collaborators::new(notifier, Arc::new(LoggingPersister))
        .with_lookuper(Arc::new(NoLookup));

    let manager = StateManager::start(config, collaborators).context("invalid state settings")?;
    manager.attach(connector).await?;

    // Nothing reads the feed when only polling; dropping it keeps the
    // session from stalling on a full buffer.
    if !cli.mode.uses_events() {
        drop(connector.take_feed().await);
    }

    info!(host = %cli.host, node = cli.node, mode = %cli.mode, "monitoring");

    let printer = tokio::spawn(print_notifications(rx, cli.json));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("interrupted, shutting down");

    // Stopping the manager drops the notifier, which closes the channel
    // once the printer has drained it. The connector is shut down by main.
    manager.stop().await;
    if let Err(e) = printer.await {
        warn!(error = %e, "printer task failed");
    }
    Ok(())
}

async fn cmd_status(cli: &Cli, connector: &Connector) -> Result<()> {
    drop(connector.take_feed().await);
    connector
        .wait_ready(READY_TIMEOUT)
        .await
        .with_context(|| format!("could not log in to {}:{}", cli.host, cli.port))?;

    let poller = Poller::new(
        connector.clone(),
        cli.node,
        Duration::from_secs(cli.poll_interval),
    );
    let status = poller.poll_once().await.context("status poll failed")?;

    if cli.json {
        let mut tracker = LinkTracker::new(cli.node);
        tracker.apply_snapshot(&status, chrono::Utc::now());
        let report = serde_json::json!({
            "local": tracker.local(),
            "links": tracker.links(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", status_table(cli.node, &status));
    }
    Ok(())
}

async fn print_notifications(mut rx: broadcast::Receiver<Notification>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(notification) => {
                if json {
                    match notification_json(&notification) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!(error = %e, "failed to encode notification"),
                    }
                } else {
                    println!("{}", notification_text(&notification));
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "printer fell behind, notifications dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("notification printer finished");
}
