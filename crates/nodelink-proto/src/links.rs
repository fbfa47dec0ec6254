//! Parsers for comma-separated linked-node lists.
//!
//! The controller reports link membership in three related shapes:
//!
//! ```text
//! LinkedNodes: T2000, R2001            (XStat body, mode prefix)
//! RPT_LINKS   = 2,T2000,R2001          (VarSet value, count then mode prefix)
//! RPT_ALINKS  = 2,2000TK,2001RU        (VarSet value, count then node, mode, keyed)
//! ```
//!
//! Malformed entries are counted and skipped.

use tracing::debug;

use nodelink_core::LinkMode;

/// One entry of a linked-node list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedNode {
    /// Remote node number.
    pub node: u32,
    /// Link mode.
    pub mode: LinkMode,
    /// Keyed flag; only `RPT_ALINKS` carries one.
    pub keyed: Option<bool>,
}

/// A parsed linked-node list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkList {
    /// Entries in report order.
    pub nodes: Vec<LinkedNode>,
    /// Number of malformed entries that were skipped.
    pub skipped: usize,
}

/// Placeholder the controller reports when nothing is linked.
const NONE_MARKER: &str = "<NONE>";

/// Parse an XStat `LinkedNodes` value such as `T2000, R2001`.
pub fn parse_linked_nodes(value: &str) -> LinkList {
    if value.trim().eq_ignore_ascii_case(NONE_MARKER) {
        return LinkList::default();
    }
    collect(value.split(',').map(str::trim), parse_prefixed)
}

/// Parse an `RPT_LINKS` value such as `2,T2000,R2001`.
pub fn parse_rpt_links(value: &str) -> LinkList {
    let (declared, entries) = split_count(value);
    let list = collect(entries, parse_prefixed);
    check_count(declared, &list, "RPT_LINKS");
    list
}

/// Parse an `RPT_ALINKS` value such as `2,2000TK,2001RU`.
pub fn parse_rpt_alinks(value: &str) -> LinkList {
    let (declared, entries) = split_count(value);
    let list = collect(entries, parse_suffixed);
    check_count(declared, &list, "RPT_ALINKS");
    list
}

fn collect<'a, I, F>(entries: I, parse: F) -> LinkList
where
    I: Iterator<Item = &'a str>,
    F: Fn(&str) -> Option<LinkedNode>,
{
    let mut list = LinkList::default();
    for entry in entries.filter(|e| !e.is_empty()) {
        match parse(entry) {
            Some(node) => list.nodes.push(node),
            None => {
                debug!(entry, "skipping malformed linked-node entry");
                list.skipped += 1;
            }
        }
    }
    list
}

/// Split a leading count off a VarSet link list.
fn split_count(value: &str) -> (Option<usize>, impl Iterator<Item = &str>) {
    let mut entries = value.split(',').map(str::trim).peekable();
    let declared = entries.peek().and_then(|first| first.parse::<usize>().ok());
    if declared.is_some() {
        entries.next();
    }
    (declared, entries)
}

fn check_count(declared: Option<usize>, list: &LinkList, variable: &str) {
    if let Some(declared) = declared {
        if declared != list.nodes.len() {
            debug!(
                variable,
                declared,
                parsed = list.nodes.len(),
                "link count does not match entries"
            );
        }
    }
}

/// `T2000` -> Transceive 2000.
fn parse_prefixed(entry: &str) -> Option<LinkedNode> {
    let split = entry.find(|c: char| c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let (code, digits) = entry.split_at(split);
    let node = digits.parse().ok()?;
    Some(LinkedNode {
        node,
        mode: LinkMode::from_code(code),
        keyed: None,
    })
}

/// `2000TK` -> Transceive 2000, keyed.
fn parse_suffixed(entry: &str) -> Option<LinkedNode> {
    let split = entry.find(|c: char| !c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let (digits, suffix) = entry.split_at(split);
    let node = digits.parse().ok()?;
    let mut chars = suffix.chars();
    let mode = chars.next()?;
    let keyed = match chars.next()? {
        'K' | 'k' => true,
        'U' | 'u' => false,
        _ => return None,
    };
    if chars.next().is_some() {
        return None;
    }
    Some(LinkedNode {
        node,
        mode: LinkMode::from_code(&mode.to_string()),
        keyed: Some(keyed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_nodes_with_modes() {
        let list = parse_linked_nodes("T2000, R2001, C2002, M2003");
        assert_eq!(list.skipped, 0);
        let modes: Vec<_> = list.nodes.iter().map(|n| (n.node, n.mode.clone())).collect();
        assert_eq!(
            modes,
            vec![
                (2000, LinkMode::Transceive),
                (2001, LinkMode::ReceiveOnly),
                (2002, LinkMode::Connecting),
                (2003, LinkMode::Monitor),
            ]
        );
    }

    #[test]
    fn linked_nodes_unknown_mode_passes_through() {
        let list = parse_linked_nodes("X2000");
        assert_eq!(list.nodes[0].mode, LinkMode::Other("X".into()));
    }

    #[test]
    fn linked_nodes_skips_garbage() {
        let list = parse_linked_nodes("T2000, 2001, Tabc, , R3123456");
        assert_eq!(list.nodes.len(), 2);
        assert_eq!(list.skipped, 2);
        assert_eq!(list.nodes[1].node, 3_123_456);
    }

    #[test]
    fn linked_nodes_empty() {
        assert_eq!(parse_linked_nodes(""), LinkList::default());
        assert_eq!(parse_linked_nodes("<NONE>"), LinkList::default());
    }

    #[test]
    fn rpt_links_with_count() {
        let list = parse_rpt_links("2,T2000,R2001");
        assert_eq!(list.nodes.len(), 2);
        assert_eq!(list.nodes[1].mode, LinkMode::ReceiveOnly);
        assert_eq!(list.nodes[0].keyed, None);
    }

    #[test]
    fn rpt_links_zero() {
        let list = parse_rpt_links("0");
        assert!(list.nodes.is_empty());
        assert_eq!(list.skipped, 0);
    }

    #[test]
    fn rpt_alinks_keyed_flags() {
        let list = parse_rpt_alinks("3,2000TK,2001RU,3123456TU");
        assert_eq!(list.skipped, 0);
        assert_eq!(list.nodes[0].node, 2000);
        assert_eq!(list.nodes[0].mode, LinkMode::Transceive);
        assert_eq!(list.nodes[0].keyed, Some(true));
        assert_eq!(list.nodes[1].keyed, Some(false));
        assert_eq!(list.nodes[2].node, 3_123_456);
    }

    #[test]
    fn rpt_alinks_skips_malformed() {
        let list = parse_rpt_alinks("3,2000TK,2001T,2002TX");
        assert_eq!(list.nodes.len(), 1);
        assert_eq!(list.skipped, 2);
    }
}
