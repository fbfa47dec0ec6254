// Rendering of notifications and polled status for the terminal.

use nodelink::{CombinedNodeStatus, LinkInfo, Notification, TxEdgeKind, format_elapsed};

/// One JSON object per notification, tagged with its `type`.
pub fn notification_json(notification: &Notification) -> serde_json::Result<String> {
    serde_json::to_string(notification)
}

/// A short human-readable line (or lines) per notification.
pub fn notification_text(notification: &Notification) -> String {
    let at = notification.at().format("%H:%M:%S%.3f");
    match notification {
        Notification::Snapshot { local, links, .. } => {
            let nodes: Vec<String> = links.iter().map(|l| l.node.to_string()).collect();
            format!(
                "{at} snapshot    node {} tx={} rx={} links=[{}]",
                local.node,
                on_off(local.tx_keyed),
                on_off(local.rx_keyed),
                nodes.join(", ")
            )
        }
        Notification::LinksAdded { links, .. } => links
            .iter()
            .map(|link| format!("{at} linked      {}", describe(link)))
            .collect::<Vec<_>>()
            .join("\n"),
        Notification::LinksRemoved { nodes, .. } => nodes
            .iter()
            .map(|node| format!("{at} unlinked    {node}"))
            .collect::<Vec<_>>()
            .join("\n"),
        Notification::TxBatch { events, .. } => events
            .iter()
            .map(|ev| match ev.kind {
                TxEdgeKind::Start => format!("{at} tx start    {}", ev.node),
                TxEdgeKind::Stop => format!(
                    "{at} tx stop     {} (total {}s)",
                    ev.node,
                    ev.total_tx_seconds.unwrap_or(0)
                ),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// A table of a polled snapshot.
pub fn status_table(node: u32, status: &CombinedNodeStatus) -> String {
    let mut out = format!(
        "Node {node}: {} link(s), local tx {}, rx {}\n",
        status.len(),
        status.local_tx_keyed.map(on_off).unwrap_or("?"),
        status.local_rx_keyed.map(on_off).unwrap_or("?"),
    );
    out.push_str(&format!(
        "{:<8} {:<16} {:<4} {:<9} {:<13} {}\n",
        "Node", "IP", "Dir", "Up", "Mode", "Keyed"
    ));
    for (n, st) in &status.nodes {
        let conn = &st.connection;
        out.push_str(&format!(
            "{:<8} {:<16} {:<4} {:<9} {:<13} {}\n",
            n,
            conn.ip.as_deref().unwrap_or("-"),
            conn.direction.to_string(),
            format_elapsed(conn.elapsed),
            conn.mode.as_ref().map(|m| m.to_string()).unwrap_or_default(),
            if st.is_keyed() { "yes" } else { "no" }
        ));
    }
    out
}

fn describe(link: &LinkInfo) -> String {
    let mut text = link.node.to_string();
    if let Some(name) = &link.name {
        text.push_str(&format!(" {name}"));
    }
    if let Some(mode) = &link.mode {
        text.push_str(&format!(" [{mode}]"));
    }
    if let Some(ip) = &link.ip {
        text.push_str(&format!(" {ip}"));
    }
    text
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
