//! Monitor link changes in real time.
//!
//! Runs a connector plus state manager in hybrid mode and prints every
//! notification for 60 seconds: links coming and going, batched transmit
//! edges, and full snapshots.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p nodelink --example monitor_links
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodelink::client::ConnectorBuilder;
use nodelink::state::{Collaborators, StateConfig, StateManager};
use nodelink::{BroadcastNotifier, LinkRecord, Notification, Persister, TxEdgeKind};

/// Prints records instead of storing them.
struct PrintPersister;

#[async_trait]
impl Persister for PrintPersister {
    async fn upsert(&self, record: LinkRecord) -> nodelink::Result<()> {
        println!("             persist {} total {}s", record.node, record.total_tx_seconds);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = "192.168.1.50";
    let node = 1999;

    let connector = ConnectorBuilder::new()
        .host(host)
        .credentials("admin", "llcgi")
        .start()?;

    let notifier = Arc::new(BroadcastNotifier::new(64));
    let mut notifications = notifier.subscribe();
    let manager = StateManager::start(
        StateConfig::new(node).poll_interval(Duration::from_secs(2)),
        Collaborators::new(notifier, Arc::new(PrintPersister)),
    )?;
    manager.attach(&connector).await?;

    println!("Monitoring node {} on {} for 60 seconds...\n", node, host);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let start = tokio::time::Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, notifications.recv()).await {
            Ok(Ok(notification)) => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());
                match notification {
                    Notification::Snapshot { local, links, .. } => {
                        let nodes: Vec<_> = links.iter().map(|l| l.node).collect();
                        println!("{} snapshot   tx={} links={:?}", timestamp, local.tx_keyed, nodes);
                    }
                    Notification::LinksAdded { links, .. } => {
                        for link in links {
                            println!("{} added      {}", timestamp, link.node);
                        }
                    }
                    Notification::LinksRemoved { nodes, .. } => {
                        println!("{} removed    {:?}", timestamp, nodes);
                    }
                    Notification::TxBatch { events, .. } => {
                        for ev in events {
                            match ev.kind {
                                TxEdgeKind::Start => println!("{} tx start   {}", timestamp, ev.node),
                                TxEdgeKind::Stop => println!(
                                    "{} tx stop    {} (total {}s)",
                                    timestamp,
                                    ev.node,
                                    ev.total_tx_seconds.unwrap_or(0)
                                ),
                            }
                        }
                    }
                }
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("(missed {} notifications due to lag)", n);
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) | Err(_) => break,
        }
    }

    manager.stop().await;
    connector.shutdown().await;
    println!("\nMonitoring complete.");
    Ok(())
}
