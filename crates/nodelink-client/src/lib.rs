//! nodelink-client: reconnecting client for the repeater controller's
//! management interface.
//!
//! [`Connector`] dials the controller, logs in, keeps the session alive
//! with pings, and reconnects with exponential backoff whenever the
//! session fails. Callers issue correlated requests through any clone of
//! the handle and consume unsolicited traffic from the [`MessageFeed`].
//!
//! # Example
//!
//! ```no_run
//! use nodelink_client::ConnectorBuilder;
//! use nodelink_proto::Action;
//! use std::time::Duration;
//!
//! # async fn example() -> nodelink_core::Result<()> {
//! let connector = ConnectorBuilder::new()
//!     .host("192.168.1.50")
//!     .credentials("admin", "llcgi")
//!     .start()?;
//! connector.wait_ready(Duration::from_secs(10)).await?;
//!
//! let xstat = connector.request(Action::xstat(1999)).await?;
//! println!("{}", xstat.body());
//!
//! connector.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod connector;
pub mod feed;
pub mod state;

pub use backoff::Backoff;
pub use config::{ConnectorBuilder, ConnectorConfig};
pub use connector::Connector;
pub use feed::MessageFeed;
pub use state::ConnectorState;
