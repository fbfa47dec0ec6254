//! One-shot status query.
//!
//! Connects to a controller, prints its banner, then asks for the local
//! node's connection list (XStat), keying history (SawStat) and voter
//! receivers (VoterStatus) and prints what came back.
//!
//! # Requirements
//!
//! - A repeater controller with its management interface enabled
//! - Host, credentials and node number adjusted for your system
//!
//! # Usage
//!
//! ```sh
//! cargo run -p nodelink --example node_status
//! ```

use std::time::Duration;

use chrono::Utc;
use nodelink::client::ConnectorBuilder;
use nodelink::proto::{Action, parse_sawstat, parse_voter_status, parse_xstat};
use nodelink::{CombinedNodeStatus, format_elapsed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Adjust these to match your node.
    let host = "192.168.1.50";
    let node = 1999;

    println!("Connecting to {}...", host);

    let connector = ConnectorBuilder::new()
        .host(host)
        .credentials("admin", "llcgi")
        .request_timeout(Duration::from_secs(3))
        .start()?;
    connector.wait_ready(Duration::from_secs(10)).await?;

    if let Some(banner) = connector.banner().await {
        println!("Connected: {}", banner);
    }

    let xstat = connector.request(Action::xstat(node)).await?;
    let xstat = parse_xstat(node, &xstat.body())?;
    let sawstat = connector.request(Action::sawstat(node)).await?;
    let sawstat = parse_sawstat(node, &sawstat.body(), Utc::now())?;

    let tx = xstat.tx_keyed().unwrap_or(false);
    let status = CombinedNodeStatus::combine(xstat.connections, &sawstat.keying);
    println!("\nNode {} ({} links, local TX {})", node, status.len(), if tx { "ON" } else { "off" });
    println!("{:<8} {:<16} {:<4} {:<9} {:<12} {}", "Node", "IP", "Dir", "Up", "Mode", "Keyed");
    println!("{:-<8} {:-<16} {:-<4} {:-<9} {:-<12} {:-<5}", "", "", "", "", "", "");
    for (n, st) in &status.nodes {
        let conn = &st.connection;
        println!(
            "{:<8} {:<16} {:<4} {:<9} {:<12} {}",
            n,
            conn.ip.as_deref().unwrap_or("-"),
            conn.direction,
            format_elapsed(conn.elapsed),
            conn.mode.as_ref().map(|m| m.to_string()).unwrap_or_default(),
            if st.is_keyed() { "yes" } else { "" }
        );
    }

    // Not every node runs a voter; an error response just means none.
    match connector.request(Action::voter_status(node)).await {
        Ok(response) => {
            let voter = parse_voter_status(node, &response.body())?;
            for section in &voter.sections {
                println!("\nVoter {}", section.node);
                for rx in &section.receivers {
                    let marker = if rx.voted { "*" } else { " " };
                    println!("  {} {:<16} RSSI {:>3}", marker, rx.name, rx.rssi.unwrap_or(0));
                }
            }
        }
        Err(e) => println!("\nNo voter status: {}", e),
    }

    connector.shutdown().await;
    println!("\nDone.");
    Ok(())
}
