//! Change notifications delivered to the broadcast collaborator.
//!
//! The state manager emits these through a [`Notifier`](crate::Notifier)
//! in observation order. Transmit edges are coalesced into
//! [`Notification::TxBatch`] windows; membership changes and full
//! snapshots go out immediately after any pending batch is flushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LinkInfo, LocalNodeState, TxEvent};

/// A timestamped change notification.
///
/// Serialises with a `type` tag so a broadcast hub can forward it to web
/// clients verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The complete live state.
    Snapshot {
        /// When the snapshot was taken.
        at: DateTime<Utc>,
        /// Local node state.
        local: LocalNodeState,
        /// All live links, ordered by node number.
        links: Vec<LinkInfo>,
    },

    /// Links that appeared since the previous update.
    LinksAdded {
        /// When the links were observed.
        at: DateTime<Utc>,
        /// The new links.
        links: Vec<LinkInfo>,
    },

    /// Links that disappeared since the previous update.
    LinksRemoved {
        /// When the removal was observed.
        at: DateTime<Utc>,
        /// Node numbers of the removed links.
        nodes: Vec<u32>,
    },

    /// Transmit edges collected during one batch window, in observation order.
    TxBatch {
        /// When the batch was flushed.
        at: DateTime<Utc>,
        /// The edges.
        events: Vec<TxEvent>,
    },
}

impl Notification {
    /// Timestamp carried by the notification.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Notification::Snapshot { at, .. }
            | Notification::LinksAdded { at, .. }
            | Notification::LinksRemoved { at, .. }
            | Notification::TxBatch { at, .. } => *at,
        }
    }

    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Snapshot { .. } => "snapshot",
            Notification::LinksAdded { .. } => "links_added",
            Notification::LinksRemoved { .. } => "links_removed",
            Notification::TxBatch { .. } => "tx_batch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxEdgeKind;

    #[test]
    fn serializes_with_type_tag() {
        let n = Notification::LinksRemoved {
            at: Utc::now(),
            nodes: vec![2000, 2001],
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "links_removed");
        assert_eq!(json["nodes"][1], 2001);
    }

    #[test]
    fn kind_and_timestamp() {
        let at = Utc::now();
        let n = Notification::TxBatch {
            at,
            events: vec![TxEvent {
                node: 2000,
                kind: TxEdgeKind::Stop,
                at,
                total_tx_seconds: Some(5),
            }],
        };
        assert_eq!(n.kind(), "tx_batch");
        assert_eq!(n.at(), at);
    }
}
