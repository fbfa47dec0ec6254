//! Read access to the live link set.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use nodelink_core::{LinkInfo, LocalNodeState};

use crate::tracker::LinkTracker;

/// Everything live at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// When the snapshot was taken.
    pub at: DateTime<Utc>,
    /// Local node state.
    pub local: LocalNodeState,
    /// All live links, ordered by node number.
    pub links: Vec<LinkInfo>,
}

/// Cloneable reader for the state manager's live state.
///
/// Readers share a read lock; the state manager holds the write lock for
/// the whole of each diff, so a reader never sees a half-applied update.
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<RwLock<LinkTracker>>,
}

impl StateHandle {
    pub(crate) fn new(tracker: LinkTracker) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tracker)),
        }
    }

    pub(crate) fn tracker(&self) -> &RwLock<LinkTracker> {
        &self.inner
    }

    /// The complete live state.
    pub async fn snapshot(&self) -> StateSnapshot {
        let tracker = self.inner.read().await;
        StateSnapshot {
            at: Utc::now(),
            local: tracker.local().clone(),
            links: tracker.links(),
        }
    }

    /// The live link for `node`.
    pub async fn link(&self, node: u32) -> Option<LinkInfo> {
        self.inner.read().await.link(node).cloned()
    }

    /// Local node state.
    pub async fn local(&self) -> LocalNodeState {
        self.inner.read().await.local().clone()
    }
}
