//! # nodelink -- Link Monitoring for Repeater Controllers
//!
//! `nodelink` is an asynchronous Rust library that talks to a repeater
//! controller's text management interface (the AllStarLink `app_rpt`
//! flavour of Asterisk AMI) and keeps a live, diffable model of which
//! remote nodes are linked and who is transmitting. It is built for
//! dashboards and loggers that must ride out flaky TCP sessions for
//! months at a time.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! nodelink = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect and read the node's connection list:
//!
//! ```no_run
//! use std::time::Duration;
//! use nodelink::client::ConnectorBuilder;
//! use nodelink::proto::{Action, parse_xstat};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = ConnectorBuilder::new()
//!         .host("192.168.1.50")
//!         .credentials("admin", "llcgi")
//!         .start()?;
//!     connector.wait_ready(Duration::from_secs(10)).await?;
//!
//!     let response = connector.request(Action::xstat(1999)).await?;
//!     let xstat = parse_xstat(1999, &response.body())?;
//!     for conn in &xstat.connections {
//!         println!("{} {} keyed={}", conn.node, conn.direction, conn.is_keyed);
//!     }
//!
//!     connector.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                   | Purpose                                              |
//! |-------------------------|------------------------------------------------------|
//! | `nodelink-core`         | Types, notifications, collaborator traits, errors    |
//! | `nodelink-proto`        | Frame reader, classifier, actions, block parsers     |
//! | `nodelink-client`       | [`Connector`](client::Connector): login, keepalive, reconnect, correlation |
//! | `nodelink-state`        | [`StateManager`](state::StateManager): diffing, TX batching, persistence |
//! | **`nodelink`**          | This facade crate -- re-exports everything           |
//!
//! Data flows one way: socket bytes, frames, classified messages, parsed
//! blocks, state diffs, and finally [`Notification`]s and [`LinkRecord`]s
//! handed to the [`Notifier`] and [`Persister`] you supply.
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                  | Default |
//! |----------|------------------------------------------|---------|
//! | `client` | [`client`] module (the connector)        | yes     |
//! | `state`  | [`state`] module (the state manager)     | yes     |
//!
//! With both disabled only the data model and the pure protocol parsers
//! remain, which is enough for offline analysis of captured sessions.
//!
//! ## Notifications
//!
//! The state manager reports changes in observation order:
//!
//! ```no_run
//! use nodelink::Notification;
//! # async fn example(mut rx: tokio::sync::broadcast::Receiver<Notification>) {
//! while let Ok(notification) = rx.recv().await {
//!     match notification {
//!         Notification::LinksAdded { links, .. } => {
//!             for link in links {
//!                 println!("+ {}", link.node);
//!             }
//!         }
//!         Notification::LinksRemoved { nodes, .. } => println!("- {:?}", nodes),
//!         Notification::TxBatch { events, .. } => println!("{} tx edges", events.len()),
//!         Notification::Snapshot { links, .. } => println!("{} links", links.len()),
//!     }
//! }
//! # }
//! ```

pub use nodelink_core::*;

/// Wire protocol: framing, classification, actions and block parsers.
///
/// Pure code with no sockets or tasks; usable on captured traffic.
pub mod proto {
    pub use nodelink_proto::*;
}

/// Controller session management.
///
/// Provides [`Connector`](client::Connector) and
/// [`ConnectorBuilder`](client::ConnectorBuilder): a long-lived, self
/// healing session with request/response correlation and a message feed.
#[cfg(feature = "client")]
pub mod client {
    pub use nodelink_client::*;
}

/// Link state tracking.
///
/// Provides [`StateManager`](state::StateManager), which turns live events
/// and polled snapshots into ordered change notifications and persistence
/// calls.
#[cfg(feature = "state")]
pub mod state {
    pub use nodelink_state::*;
}
