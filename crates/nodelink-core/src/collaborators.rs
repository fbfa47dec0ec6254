//! Capability traits for the state manager's downstream collaborators.
//!
//! The state manager depends on three narrow seams rather than on concrete
//! services:
//!
//! - [`Notifier`] -- delivers ordered change notifications (a broadcast hub)
//! - [`Persister`] -- durably records per-link transmit totals
//! - [`Lookuper`] -- resolves node numbers to names and descriptions
//!
//! Production code plugs in real services; tests use the in-memory fakes
//! from the `nodelink-test-harness` crate.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::notification::Notification;
use crate::types::{LinkRecord, NodeDirectoryEntry};

/// Receives change notifications in the order they were produced.
///
/// Implementations should return promptly; the state manager bounds every
/// call with a short timeout and logs failures without retrying.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Durable store for per-link transmit totals.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Insert or update the record for `record.node`.
    ///
    /// Called on every transmit STOP edge and when a link is removed.
    async fn upsert(&self, record: LinkRecord) -> Result<()>;
}

/// Read-only node directory.
pub trait Lookuper: Send + Sync {
    /// Resolve a node number.
    ///
    /// `Ok(None)` means the directory answered and the node is unknown.
    /// An `Err` means the directory could not answer and the lookup may be
    /// retried later.
    fn lookup(&self, node: u32) -> Result<Option<NodeDirectoryEntry>>;
}

/// A [`Notifier`] that fans notifications out over a
/// [`tokio::sync::broadcast`] channel.
///
/// Delivery is best-effort: slow subscribers may lag and miss
/// notifications, and having no subscribers at all is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Create a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if self.tx.send(notification).is_err() {
            tracing::trace!("no notification subscribers");
        }
        Ok(())
    }
}

/// A [`Lookuper`] that never knows any node.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl Lookuper for NoLookup {
    fn lookup(&self, _node: u32) -> Result<Option<NodeDirectoryEntry>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn broadcast_notifier_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier
            .notify(Notification::LinksRemoved {
                at: Utc::now(),
                nodes: vec![2000],
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Notification::LinksRemoved { nodes, .. } => assert_eq!(nodes, vec![2000]),
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_notifier_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(8);
        let result = notifier
            .notify(Notification::LinksRemoved {
                at: Utc::now(),
                nodes: vec![],
            })
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn no_lookup_returns_none() {
        assert_eq!(NoLookup.lookup(2000).unwrap(), None);
    }
}
