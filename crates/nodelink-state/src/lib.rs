//! nodelink-state: Link state manager for nodelink.
//!
//! Turns the connector's loosely structured stream (live `VarSet` events
//! and/or polled XStat/SawStat snapshots) into a consistent model of which
//! remote nodes are linked and who is transmitting, and reports changes to
//! the notifier and persister collaborators.
//!
//! # Pieces
//!
//! - [`LinkTracker`] -- synchronous diff engine returning ordered [`Change`]s
//! - [`TxBatcher`] -- fixed-window coalescing of transmit edges
//! - [`Poller`] -- periodic snapshot producer
//! - [`StateManager`] -- the task tying it all together
//! - [`StateHandle`] -- lock-protected read access for outside consumers

pub mod batch;
pub mod config;
pub mod handle;
pub mod manager;
mod persist;
pub mod poller;
pub mod tracker;
pub mod update;

pub use batch::TxBatcher;
pub use config::{StateConfig, UpdateMode};
pub use handle::{StateHandle, StateSnapshot};
pub use manager::{Collaborators, StateManager};
pub use poller::Poller;
pub use tracker::{Change, LinkTracker};
pub use update::{Observation, StateUpdate, interpret};
