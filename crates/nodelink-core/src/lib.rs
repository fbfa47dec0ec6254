//! nodelink-core: Core types, collaborator traits, and error definitions.
//!
//! This crate defines the data model shared by every nodelink crate: what
//! the repeater controller reports about its links, what the state manager
//! keeps per link, and the notifications it emits. Consumers of the state
//! stream depend on these types without pulling in the protocol client.
//!
//! # Key types
//!
//! - [`Connection`], [`KeyingInfo`], [`CombinedNodeStatus`] -- polled link state
//! - [`LinkInfo`] -- the per-link aggregate owned by the state manager
//! - [`Notification`] -- ordered change notifications
//! - [`Notifier`], [`Persister`], [`Lookuper`] -- downstream collaborator seams
//! - [`Error`] / [`Result`] -- error handling

pub mod collaborators;
pub mod error;
pub mod helpers;
pub mod notification;
pub mod types;

// Re-export key types at crate root for ergonomic `use nodelink_core::*`.
pub use collaborators::{BroadcastNotifier, Lookuper, NoLookup, Notifier, Persister};
pub use error::{Error, Result};
pub use helpers::{format_elapsed, parse_elapsed};
pub use notification::Notification;
pub use types::*;
