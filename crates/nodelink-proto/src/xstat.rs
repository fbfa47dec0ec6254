//! Parser for `RptStatus`/`XStat` response bodies.
//!
//! An XStat body lists one `Conn:` row per linked node, a `LinkedNodes:`
//! summary carrying each node's link mode, and the controller's channel
//! variables as `Var: NAME=VALUE` lines:
//!
//! ```text
//! Response: Success
//! Node: 1999
//! Conn: 2000 192.168.1.10 0 OUT 00:15:30 ESTABLISHED
//! Conn: 3123456 1 IN 00:02:11 ESTABLISHED
//! LinkedNodes: T2000, T3123456
//! Var: RPT_TXKEYED=0
//! ```
//!
//! EchoLink nodes have no IP column, so their rows are one field shorter.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::debug;

use nodelink_core::error::Result;
use nodelink_core::{Connection, LinkMode, format_elapsed, is_echolink_node, parse_elapsed};

use crate::block::{check_error, header_lines, parse_flag};
use crate::links::parse_linked_nodes;

/// Variable reporting the local transmitter keyed state.
pub const TX_KEYED_VAR: &str = "RPT_TXKEYED";

/// Variable reporting the local receiver keyed state.
pub const RX_KEYED_VAR: &str = "RPT_RXKEYED";

/// A parsed XStat response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XStat {
    /// Local node the report was requested for.
    pub node: u32,
    /// Linked nodes, in report order, with link modes merged in.
    pub connections: Vec<Connection>,
    /// Channel variables from `Var:` lines.
    pub variables: BTreeMap<String, String>,
    /// Number of malformed lines that were skipped.
    pub skipped: usize,
    /// How many of the skipped lines were `Conn:` rows.
    pub skipped_conns: usize,
}

impl XStat {
    /// Whether every connection row parsed, so `connections` is the full
    /// link membership.
    pub fn membership_complete(&self) -> bool {
        self.skipped_conns == 0
    }

    /// Local transmitter keyed, if the report carried `RPT_TXKEYED`.
    pub fn tx_keyed(&self) -> Option<bool> {
        self.variables.get(TX_KEYED_VAR).and_then(|v| parse_flag(v))
    }

    /// Local receiver keyed, if the report carried `RPT_RXKEYED`.
    pub fn rx_keyed(&self) -> Option<bool> {
        self.variables.get(RX_KEYED_VAR).and_then(|v| parse_flag(v))
    }
}

/// Parse an XStat response body for `local_node`.
///
/// Malformed lines are skipped and counted in [`XStat::skipped`]. Rows
/// naming the local node itself are ignored. Fails only when the body is
/// an error response.
pub fn parse_xstat(local_node: u32, body: &str) -> Result<XStat> {
    check_error(body)?;

    let mut xstat = XStat {
        node: local_node,
        ..XStat::default()
    };
    let mut modes: HashMap<u32, LinkMode> = HashMap::new();

    for (key, value) in header_lines(body) {
        if key.eq_ignore_ascii_case("Conn") {
            match parse_conn(value) {
                Some(conn) if conn.node == local_node => {
                    debug!(node = local_node, "ignoring connection row for local node");
                }
                Some(conn) => xstat.connections.push(conn),
                None => {
                    debug!(line = value, "skipping malformed Conn line");
                    xstat.skipped += 1;
                    xstat.skipped_conns += 1;
                }
            }
        } else if key.eq_ignore_ascii_case("LinkedNodes") {
            let list = parse_linked_nodes(value);
            xstat.skipped += list.skipped;
            for linked in list.nodes {
                modes.insert(linked.node, linked.mode);
            }
        } else if key.eq_ignore_ascii_case("Var") {
            match value.split_once('=') {
                Some((name, val)) if !name.trim().is_empty() => {
                    xstat
                        .variables
                        .insert(name.trim().to_string(), val.trim().to_string());
                }
                _ => {
                    debug!(line = value, "skipping malformed Var line");
                    xstat.skipped += 1;
                }
            }
        }
    }

    for conn in &mut xstat.connections {
        conn.mode = modes.get(&conn.node).cloned();
    }

    Ok(xstat)
}

/// Parse the value of one `Conn:` row.
///
/// The row layout is chosen by node number, never by field count.
fn parse_conn(value: &str) -> Option<Connection> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let node: u32 = fields.first()?.parse().ok()?;

    let (ip, rest) = if is_echolink_node(node) {
        (None, &fields[1..])
    } else {
        (Some(fields.get(1)?.to_string()), fields.get(2..)?)
    };
    if rest.len() < 4 {
        return None;
    }

    let is_keyed = parse_flag(rest[0])?;
    let direction = rest[1].parse().ok()?;
    let elapsed = parse_elapsed(rest[2]).unwrap_or_else(|| {
        debug!(node, elapsed = rest[2], "unparseable link age, using zero");
        Duration::ZERO
    });
    let link_type = rest[3..].join(" ");

    Some(Connection {
        node,
        ip,
        is_keyed,
        direction,
        elapsed,
        link_type,
        mode: None,
    })
}

/// Format a connection as an XStat `Conn:` line.
pub fn format_conn_line(conn: &Connection) -> String {
    let keyed = if conn.is_keyed { "1" } else { "0" };
    let elapsed = format_elapsed(conn.elapsed);
    match &conn.ip {
        Some(ip) if !is_echolink_node(conn.node) => format!(
            "Conn: {} {} {} {} {} {}",
            conn.node, ip, keyed, conn.direction, elapsed, conn.link_type
        ),
        _ => format!(
            "Conn: {} {} {} {} {}",
            conn.node, keyed, conn.direction, elapsed, conn.link_type
        ),
    }
}

/// Format a full XStat body: `Conn:` rows, `LinkedNodes:`, and `Var:` lines.
pub fn format_xstat(xstat: &XStat) -> String {
    let mut lines = vec!["Response: Success".to_string(), format!("Node: {}", xstat.node)];
    lines.extend(xstat.connections.iter().map(format_conn_line));

    let linked: Vec<String> = xstat
        .connections
        .iter()
        .filter_map(|c| c.mode.as_ref().map(|m| format!("{}{}", m.code(), c.node)))
        .collect();
    if linked.is_empty() {
        lines.push("LinkedNodes: <NONE>".to_string());
    } else {
        lines.push(format!("LinkedNodes: {}", linked.join(", ")));
    }

    lines.extend(
        xstat
            .variables
            .iter()
            .map(|(name, value)| format!("Var: {name}={value}")),
    );
    lines.join("\n")
}
