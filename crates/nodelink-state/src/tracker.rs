//! The synchronous diff engine behind the state manager.
//!
//! [`LinkTracker`] owns the live [`LinkInfo`] set. Every update takes an
//! explicit `now` and returns the ordered [`Change`]s it caused; the
//! tracker itself performs no I/O, so whoever drives it decides how changes
//! reach the notifier and the persister.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use nodelink_core::{
    CombinedNodeStatus, LinkInfo, LinkRecord, LocalNodeState, Lookuper, NodeStatus, TxEdgeKind,
    TxEvent,
};
use nodelink_proto::LinkList;

/// One consequence of an update, in the order it must be acted on.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Links that appeared, as they were when first seen.
    Added(Vec<LinkInfo>),
    /// Links that disappeared; already deleted from the tracker.
    Removed(Vec<u32>),
    /// A transmit edge to queue in the current batch.
    TxEdge(TxEvent),
    /// A record to hand to the persister.
    Persist(LinkRecord),
    /// The local node's keying changed.
    LocalChanged(LocalNodeState),
}

impl Change {
    /// Whether the change alters which links exist or the local state.
    pub fn needs_snapshot(&self) -> bool {
        matches!(
            self,
            Change::Added(_) | Change::Removed(_) | Change::LocalChanged(_)
        )
    }
}

/// Live link set plus local node state.
#[derive(Debug, Clone, Default)]
pub struct LinkTracker {
    local: LocalNodeState,
    links: BTreeMap<u32, LinkInfo>,
}

impl LinkTracker {
    /// An empty tracker for `local_node`.
    pub fn new(local_node: u32) -> Self {
        Self {
            local: LocalNodeState {
                node: local_node,
                ..LocalNodeState::default()
            },
            links: BTreeMap::new(),
        }
    }

    /// Local node state.
    pub fn local(&self) -> &LocalNodeState {
        &self.local
    }

    /// The live link for `node`.
    pub fn link(&self, node: u32) -> Option<&LinkInfo> {
        self.links.get(&node)
    }

    /// All live links, ordered by node number.
    pub fn links(&self) -> Vec<LinkInfo> {
        self.links.values().cloned().collect()
    }

    /// Number of live links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no links are live.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Apply a polled snapshot.
    ///
    /// Nodes missing from the snapshot are removed, new ones are added with
    /// `connected_since = now - elapsed`, and keying is compared against
    /// each link's transmit state. A partial snapshot adds and keys links
    /// but removes none.
    pub fn apply_snapshot(&mut self, status: &CombinedNodeStatus, now: DateTime<Utc>) -> Vec<Change> {
        let mut changes = Vec::new();
        let present: BTreeSet<u32> = status
            .nodes
            .keys()
            .copied()
            .filter(|&n| n != self.local.node)
            .collect();
        if status.partial {
            debug!("snapshot had malformed rows, keeping missing links");
        } else {
            self.remove_missing(&present, now, &mut changes);
        }

        let mut added = Vec::new();
        for (&node, st) in status.nodes.iter().filter(|(n, _)| present.contains(*n)) {
            let link = self.links.entry(node).or_insert_with(|| {
                let since = chrono::Duration::from_std(st.connection.elapsed)
                    .ok()
                    .and_then(|elapsed| now.checked_sub_signed(elapsed))
                    .unwrap_or(now);
                added.push(node);
                LinkInfo::new(node, since)
            });
            update_from_status(link, st);
        }
        self.push_added(&added, &mut changes);

        for (&node, st) in status.nodes.iter().filter(|(n, _)| present.contains(*n)) {
            if let Some(link) = self.links.get_mut(&node) {
                observe_keying(link, st.is_keyed(), now, &mut changes);
            }
        }

        changes.extend(self.set_local(status.local_tx_keyed, status.local_rx_keyed));
        changes
    }

    /// Apply a linked-node list from a `VarSet` event.
    ///
    /// The list is the complete membership unless some entries were
    /// malformed, in which case no link is removed. Entries that carry a
    /// keyed flag (`RPT_ALINKS`) also drive transmit edges; entries without
    /// one leave keying untouched.
    pub fn apply_link_list(&mut self, list: &LinkList, now: DateTime<Utc>) -> Vec<Change> {
        let mut changes = Vec::new();
        let present: BTreeSet<u32> = list
            .nodes
            .iter()
            .map(|e| e.node)
            .filter(|&n| n != self.local.node)
            .collect();
        if list.skipped > 0 {
            debug!(skipped = list.skipped, "link list had malformed entries, keeping missing links");
        } else {
            self.remove_missing(&present, now, &mut changes);
        }

        let mut added = Vec::new();
        for entry in list.nodes.iter().filter(|e| present.contains(&e.node)) {
            let link = self.links.entry(entry.node).or_insert_with(|| {
                added.push(entry.node);
                LinkInfo::new(entry.node, now)
            });
            link.mode = Some(entry.mode.clone());
        }
        self.push_added(&added, &mut changes);

        for entry in list.nodes.iter().filter(|e| present.contains(&e.node)) {
            if let (Some(keyed), Some(link)) = (entry.keyed, self.links.get_mut(&entry.node)) {
                observe_keying(link, keyed, now, &mut changes);
            }
        }
        changes
    }

    /// Update local keying. `None` leaves a flag as it is.
    pub fn set_local(&mut self, tx_keyed: Option<bool>, rx_keyed: Option<bool>) -> Vec<Change> {
        let before = self.local.clone();
        if let Some(tx) = tx_keyed {
            self.local.tx_keyed = tx;
        }
        if let Some(rx) = rx_keyed {
            self.local.rx_keyed = rx;
        }
        if self.local == before {
            Vec::new()
        } else {
            trace!(
                tx_keyed = self.local.tx_keyed,
                rx_keyed = self.local.rx_keyed,
                "local keying changed"
            );
            vec![Change::LocalChanged(self.local.clone())]
        }
    }

    /// Resolve names for links that have not been looked up yet.
    ///
    /// A found or not-found answer is final for the link's lifetime; a
    /// failed lookup is retried on the next call. Returns how many links
    /// got an answer.
    pub fn enrich(&mut self, lookuper: &dyn Lookuper) -> usize {
        let mut answered = 0;
        for link in self.links.values_mut().filter(|l| !l.lookup_done) {
            match lookuper.lookup(link.node) {
                Ok(Some(entry)) => {
                    debug!(node = link.node, name = %entry.name, "node resolved");
                    link.name = Some(entry.name);
                    link.description = Some(entry.description);
                    link.lookup_done = true;
                    answered += 1;
                }
                Ok(None) => {
                    trace!(node = link.node, "node not in directory");
                    link.lookup_done = true;
                    answered += 1;
                }
                Err(e) => {
                    warn!(node = link.node, error = %e, "node lookup failed");
                }
            }
        }
        answered
    }

    /// Copy lookup results onto the payloads of `Added` changes.
    pub fn fill_names(&self, changes: &mut [Change]) {
        for change in changes.iter_mut() {
            if let Change::Added(links) = change {
                for link in links.iter_mut() {
                    if let Some(live) = self.links.get(&link.node) {
                        link.name.clone_from(&live.name);
                        link.description.clone_from(&live.description);
                        link.lookup_done = live.lookup_done;
                    }
                }
            }
        }
    }

    fn push_added(&self, added: &[u32], changes: &mut Vec<Change>) {
        if added.is_empty() {
            return;
        }
        debug!(nodes = ?added, "links added");
        let links = added
            .iter()
            .filter_map(|n| self.links.get(n).cloned())
            .collect();
        changes.push(Change::Added(links));
    }

    fn remove_missing(&mut self, present: &BTreeSet<u32>, now: DateTime<Utc>, changes: &mut Vec<Change>) {
        let gone: Vec<u32> = self
            .links
            .keys()
            .filter(|n| !present.contains(*n))
            .copied()
            .collect();
        if gone.is_empty() {
            return;
        }

        for node in &gone {
            if let Some(mut link) = self.links.remove(node) {
                if link.current_tx {
                    stop_tx(&mut link, now, changes);
                }
                changes.push(Change::Persist(link.record()));
            }
        }
        debug!(nodes = ?gone, "links removed");
        changes.push(Change::Removed(gone));
    }
}

fn update_from_status(link: &mut LinkInfo, status: &NodeStatus) {
    let conn = &status.connection;
    link.ip.clone_from(&conn.ip);
    link.direction = Some(conn.direction);
    link.elapsed_secs = Some(conn.elapsed.as_secs());
    link.link_type = Some(conn.link_type.clone());
    if conn.mode.is_some() {
        link.mode.clone_from(&conn.mode);
    }
    if status.has_keying {
        link.secs_since_keyed = status.keying.secs_since_keyed;
        link.last_keyed_time = status.keying.last_keyed_time;
        link.last_unkeyed_time = status.keying.last_unkeyed_time;
    }
}

fn observe_keying(link: &mut LinkInfo, keyed: bool, now: DateTime<Utc>, changes: &mut Vec<Change>) {
    link.is_keyed = keyed;
    if keyed {
        link.last_heard_at = Some(now);
    }

    match (link.current_tx, keyed) {
        (false, true) => {
            link.current_tx = true;
            link.last_tx_start = Some(now);
            trace!(node = link.node, "tx start");
            changes.push(Change::TxEdge(TxEvent {
                node: link.node,
                kind: TxEdgeKind::Start,
                at: now,
                total_tx_seconds: None,
            }));
        }
        (true, false) => {
            stop_tx(link, now, changes);
            changes.push(Change::Persist(link.record()));
        }
        _ => {}
    }
}

fn stop_tx(link: &mut LinkInfo, now: DateTime<Utc>, changes: &mut Vec<Change>) {
    let secs = link
        .last_tx_start
        .map(|start| (now - start).num_seconds().max(0) as u64)
        .unwrap_or(0);
    link.current_tx = false;
    link.is_keyed = false;
    link.last_tx_end = Some(now);
    link.last_heard_at = Some(now);
    link.total_tx_seconds += secs;
    trace!(node = link.node, secs, total = link.total_tx_seconds, "tx stop");
    changes.push(Change::TxEdge(TxEvent {
        node: link.node,
        kind: TxEdgeKind::Stop,
        at: now,
        total_tx_seconds: Some(link.total_tx_seconds),
    }));
}
