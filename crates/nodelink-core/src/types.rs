//! Core types used throughout nodelink.
//!
//! These types model what the repeater controller reports about its links:
//! raw per-link rows from connection lists ([`Connection`]), keying
//! history derived from relative offsets ([`KeyingInfo`]), the merge of
//! both ([`CombinedNodeStatus`]), and the long-lived per-node aggregate
//! maintained by the state manager ([`LinkInfo`]).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node numbers at or above this value are EchoLink nodes.
///
/// EchoLink nodes are reported without an IP column in connection lists.
pub const ECHOLINK_NODE_THRESHOLD: u32 = 3_000_000;

/// Whether a remote node number falls in the EchoLink range.
pub fn is_echolink_node(node: u32) -> bool {
    node >= ECHOLINK_NODE_THRESHOLD
}

/// Which side initiated a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The remote node connected to us.
    #[serde(rename = "IN")]
    In,
    /// We connected to the remote node.
    #[serde(rename = "OUT")]
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

/// Error returned when a string cannot be parsed into a [`Direction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDirectionError(String);

impl fmt::Display for ParseDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown link direction: {}", self.0)
    }
}

impl std::error::Error for ParseDirectionError {}

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            _ => Err(ParseDirectionError(s.to_string())),
        }
    }
}

/// Link mode as reported by the controller's linked-node lists.
///
/// The controller uses a single-letter code per node. Unknown codes are
/// carried through as [`LinkMode::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Full duplex link (`T`).
    Transceive,
    /// Receive-only link (`R`).
    ReceiveOnly,
    /// Link still being established (`C`).
    Connecting,
    /// Monitor link (`M`).
    Monitor,
    /// Any code not listed above, verbatim.
    Other(String),
}

impl LinkMode {
    /// Map a controller mode code to a [`LinkMode`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "T" => LinkMode::Transceive,
            "R" => LinkMode::ReceiveOnly,
            "C" => LinkMode::Connecting,
            "M" => LinkMode::Monitor,
            other => LinkMode::Other(other.to_string()),
        }
    }

    /// The controller's code for this mode.
    pub fn code(&self) -> &str {
        match self {
            LinkMode::Transceive => "T",
            LinkMode::ReceiveOnly => "R",
            LinkMode::Connecting => "C",
            LinkMode::Monitor => "M",
            LinkMode::Other(code) => code,
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkMode::Transceive => write!(f, "Transceive"),
            LinkMode::ReceiveOnly => write!(f, "Receive Only"),
            LinkMode::Connecting => write!(f, "Connecting"),
            LinkMode::Monitor => write!(f, "Monitor"),
            LinkMode::Other(code) => write!(f, "{code}"),
        }
    }
}

/// One row of a connection list: a remote node currently linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Remote node number.
    pub node: u32,
    /// Remote IP address. Absent for EchoLink nodes.
    pub ip: Option<String>,
    /// Whether the remote node is keyed right now.
    pub is_keyed: bool,
    /// Which side initiated the link.
    pub direction: Direction,
    /// How long the link has been up.
    pub elapsed: Duration,
    /// Link state string, e.g. `ESTABLISHED` or `CONNECTING`.
    pub link_type: String,
    /// Link mode from the linked-node list, when the controller reported one.
    pub mode: Option<LinkMode>,
}

/// Keying history for one remote node.
///
/// Derived from relative second offsets at poll time; recomputed on every
/// poll rather than accumulated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyingInfo {
    /// Whether the node is keyed right now.
    pub is_keyed: bool,
    /// Seconds since the node last keyed up; `None` if never.
    pub secs_since_keyed: Option<u64>,
    /// Absolute time of the last key-up, if any.
    pub last_keyed_time: Option<DateTime<Utc>>,
    /// Absolute time of the last key-down, if any.
    pub last_unkeyed_time: Option<DateTime<Utc>>,
}

impl KeyingInfo {
    /// Keying state for a node that has never keyed.
    pub fn never_keyed() -> Self {
        Self::default()
    }
}

/// Merged status of one linked node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// The connection-list row for the node.
    pub connection: Connection,
    /// Keying history; [`KeyingInfo::never_keyed`] when none was reported.
    pub keying: KeyingInfo,
    /// Whether a keying report existed for the node.
    pub has_keying: bool,
}

impl NodeStatus {
    /// The authoritative keyed flag for the node.
    ///
    /// The keying history wins when one was reported; otherwise the flag
    /// from the connection row is used.
    pub fn is_keyed(&self) -> bool {
        if self.has_keying {
            self.keying.is_keyed
        } else {
            self.connection.is_keyed
        }
    }
}

/// A polled snapshot: connection list merged with keying history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedNodeStatus {
    /// Per-node status keyed by remote node number.
    pub nodes: BTreeMap<u32, NodeStatus>,
    /// Local transmitter keyed, when the snapshot reported it.
    pub local_tx_keyed: Option<bool>,
    /// Local receiver keyed, when the snapshot reported it.
    pub local_rx_keyed: Option<bool>,
    /// Some connection rows were malformed, so `nodes` may be missing
    /// links that are still up.
    pub partial: bool,
}

impl CombinedNodeStatus {
    /// Merge a connection list with a keying map.
    ///
    /// Keying entries for nodes that are not in the connection list are
    /// dropped: only linked nodes appear in a snapshot. A later duplicate
    /// connection row for the same node replaces the earlier one.
    pub fn combine(connections: Vec<Connection>, keying: &HashMap<u32, KeyingInfo>) -> Self {
        let nodes = connections
            .into_iter()
            .map(|connection| {
                let node = connection.node;
                let (keying, has_keying) = match keying.get(&node) {
                    Some(k) => (k.clone(), true),
                    None => (KeyingInfo::never_keyed(), false),
                };
                (
                    node,
                    NodeStatus {
                        connection,
                        keying,
                        has_keying,
                    },
                )
            })
            .collect();

        Self {
            nodes,
            local_tx_keyed: None,
            local_rx_keyed: None,
            partial: false,
        }
    }

    /// Number of linked nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot contains no linked nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Long-lived aggregate for one linked remote node.
///
/// Owned exclusively by the state manager. Created the first time a node
/// appears, mutated on every diff, and removed the first cycle in which
/// the node no longer appears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Remote node number.
    pub node: u32,
    /// Remote IP address, if known.
    pub ip: Option<String>,
    /// Whether the node is keyed according to the latest report.
    pub is_keyed: bool,
    /// Which side initiated the link, if known.
    pub direction: Option<Direction>,
    /// Link age in seconds as last reported by the controller.
    pub elapsed_secs: Option<u64>,
    /// Link state string, e.g. `ESTABLISHED`.
    pub link_type: Option<String>,
    /// Link mode, if known.
    pub mode: Option<LinkMode>,
    /// Seconds since the last key-up as of the latest poll.
    pub secs_since_keyed: Option<u64>,
    /// Absolute time of the last key-up as of the latest poll.
    pub last_keyed_time: Option<DateTime<Utc>>,
    /// Absolute time of the last key-down as of the latest poll.
    pub last_unkeyed_time: Option<DateTime<Utc>>,
    /// Human-readable name (usually the callsign) from the lookup service.
    pub name: Option<String>,
    /// Free-form description from the lookup service.
    pub description: Option<String>,
    /// When the link came up.
    pub connected_since: DateTime<Utc>,
    /// Start of the most recent transmission.
    pub last_tx_start: Option<DateTime<Utc>>,
    /// End of the most recent transmission.
    pub last_tx_end: Option<DateTime<Utc>>,
    /// Last time the node was heard keyed.
    pub last_heard_at: Option<DateTime<Utc>>,
    /// Whether a transmission is in progress.
    pub current_tx: bool,
    /// Accumulated seconds of completed transmissions.
    pub total_tx_seconds: u64,
    /// Set once the lookup service answered for this node.
    #[serde(skip)]
    pub lookup_done: bool,
}

impl LinkInfo {
    /// A fresh aggregate for `node`, connected at `connected_since`.
    pub fn new(node: u32, connected_since: DateTime<Utc>) -> Self {
        Self {
            node,
            ip: None,
            is_keyed: false,
            direction: None,
            elapsed_secs: None,
            link_type: None,
            mode: None,
            secs_since_keyed: None,
            last_keyed_time: None,
            last_unkeyed_time: None,
            name: None,
            description: None,
            connected_since,
            last_tx_start: None,
            last_tx_end: None,
            last_heard_at: None,
            current_tx: false,
            total_tx_seconds: 0,
            lookup_done: false,
        }
    }

    /// The persistence record for this link.
    pub fn record(&self) -> LinkRecord {
        LinkRecord {
            node: self.node,
            total_tx_seconds: self.total_tx_seconds,
            last_tx_start: self.last_tx_start,
            last_tx_end: self.last_tx_end,
            connected_since: self.connected_since,
        }
    }
}

/// State of the local node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNodeState {
    /// Local node number.
    pub node: u32,
    /// Local transmitter keyed.
    pub tx_keyed: bool,
    /// Local receiver hearing a signal.
    pub rx_keyed: bool,
}

/// Direction of a transmit edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxEdgeKind {
    /// Key-up.
    Start,
    /// Key-down.
    Stop,
}

/// A single transmit edge, queued inside a batch window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    /// Remote node number.
    pub node: u32,
    /// Key-up or key-down.
    pub kind: TxEdgeKind,
    /// When the edge was observed.
    pub at: DateTime<Utc>,
    /// Accumulated transmit seconds, present on [`TxEdgeKind::Stop`].
    pub total_tx_seconds: Option<u64>,
}

/// What the persistence collaborator records for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Remote node number.
    pub node: u32,
    /// Accumulated seconds of completed transmissions.
    pub total_tx_seconds: u64,
    /// Start of the most recent transmission.
    pub last_tx_start: Option<DateTime<Utc>>,
    /// End of the most recent transmission.
    pub last_tx_end: Option<DateTime<Utc>>,
    /// When the link came up.
    pub connected_since: DateTime<Utc>,
}

/// An entry returned by the lookup collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeDirectoryEntry {
    /// Human-readable name, usually the callsign.
    pub name: String,
    /// Free-form description (location, frequency, ...).
    pub description: String,
}
