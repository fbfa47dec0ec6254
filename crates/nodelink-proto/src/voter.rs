//! Parser for `VoterStatus` response bodies (receiver lists).
//!
//! ```text
//! Node: 1999
//! Client: main *
//! RSSI: 213
//! IP: 192.168.1.20:1667
//! Client: hilltop
//! RSSI: 0
//! Voted: main
//! ```
//!
//! `Node:` opens a section, `Client:` opens a receiver inside it, and the
//! following `RSSI:`/`IP:` lines attach to the open receiver.

use tracing::debug;

use nodelink_core::error::Result;

use crate::block::{check_error, header_lines};

/// One receiver reporting to a voter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receiver {
    /// Receiver name.
    pub name: String,
    /// Flag tokens trailing the name on the `Client:` line.
    pub flags: Vec<String>,
    /// Received signal strength, 0-255.
    pub rssi: Option<u8>,
    /// Receiver address, usually `ip:port`.
    pub ip: Option<String>,
    /// Whether this receiver is currently voted.
    pub voted: bool,
}

/// The receivers of one voting node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterSection {
    /// Node number the section belongs to.
    pub node: u32,
    /// Receivers in report order.
    pub receivers: Vec<Receiver>,
    /// Name of the voted receiver, if any.
    pub voted: Option<String>,
}

/// A parsed VoterStatus response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterStatus {
    /// Local node the report was requested for.
    pub node: u32,
    /// One section per reported node.
    pub sections: Vec<VoterSection>,
    /// Number of malformed or orphaned lines that were skipped.
    pub skipped: usize,
}

impl VoterStatus {
    /// The section for the local node, if reported.
    pub fn local(&self) -> Option<&VoterSection> {
        self.sections.iter().find(|s| s.node == self.node)
    }
}

/// Parse a VoterStatus response body for `local_node`.
pub fn parse_voter_status(local_node: u32, body: &str) -> Result<VoterStatus> {
    check_error(body)?;

    let mut status = VoterStatus {
        node: local_node,
        ..VoterStatus::default()
    };

    for (key, value) in header_lines(body) {
        let ok = match key.to_ascii_lowercase().as_str() {
            "node" => match value.parse() {
                Ok(node) => {
                    status.sections.push(VoterSection {
                        node,
                        ..VoterSection::default()
                    });
                    true
                }
                Err(_) => false,
            },
            "client" => open_receiver(&mut status, value),
            "rssi" => match (value.parse::<u8>(), current_receiver(&mut status)) {
                (Ok(rssi), Some(rx)) => {
                    rx.rssi = Some(rssi);
                    true
                }
                _ => false,
            },
            "ip" => match current_receiver(&mut status) {
                Some(rx) => {
                    rx.ip = Some(value.to_string());
                    true
                }
                None => false,
            },
            "voted" => mark_voted(&mut status, value),
            _ => true,
        };
        if !ok {
            debug!(key, value, "skipping VoterStatus line");
            status.skipped += 1;
        }
    }

    Ok(status)
}

fn open_receiver(status: &mut VoterStatus, value: &str) -> bool {
    let Some(section) = status.sections.last_mut() else {
        return false;
    };
    let mut tokens = value.split_whitespace();
    let Some(name) = tokens.next() else {
        return false;
    };
    section.receivers.push(Receiver {
        name: name.to_string(),
        flags: tokens.map(str::to_string).collect(),
        ..Receiver::default()
    });
    true
}

fn current_receiver(status: &mut VoterStatus) -> Option<&mut Receiver> {
    status.sections.last_mut()?.receivers.last_mut()
}

fn mark_voted(status: &mut VoterStatus, value: &str) -> bool {
    let Some(section) = status.sections.last_mut() else {
        return false;
    };
    let name = value.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("none") {
        section.voted = None;
        return true;
    }
    for rx in &mut section.receivers {
        rx.voted = rx.name == name;
    }
    section.voted = Some(name.to_string());
    true
}
