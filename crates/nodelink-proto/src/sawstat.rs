//! Parser for `RptStatus`/`SawStat` response bodies.
//!
//! Each `Conn:` row reports the keyed flag and two relative offsets:
//!
//! ```text
//! Conn: <node> <keyed 0|1> <secs since keyed> <secs since unkeyed>
//! ```
//!
//! A negative offset means the event never happened. Offsets are turned
//! into absolute timestamps against the `now` the caller supplies, so the
//! result is recomputed per poll rather than accumulated.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;

use nodelink_core::KeyingInfo;
use nodelink_core::error::Result;

use crate::block::{check_error, header_lines, parse_flag};

/// A parsed SawStat response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SawStat {
    /// Local node the report was requested for.
    pub node: u32,
    /// Keying history per remote node.
    pub keying: HashMap<u32, KeyingInfo>,
    /// Number of malformed lines that were skipped.
    pub skipped: usize,
}

/// Parse a SawStat response body for `local_node`, relative to `now`.
pub fn parse_sawstat(local_node: u32, body: &str, now: DateTime<Utc>) -> Result<SawStat> {
    check_error(body)?;

    let mut sawstat = SawStat {
        node: local_node,
        ..SawStat::default()
    };

    for (key, value) in header_lines(body) {
        if !key.eq_ignore_ascii_case("Conn") {
            continue;
        }
        match parse_row(value, now) {
            Some((node, _)) if node == local_node => {}
            Some((node, info)) => {
                sawstat.keying.insert(node, info);
            }
            None => {
                debug!(line = value, "skipping malformed SawStat line");
                sawstat.skipped += 1;
            }
        }
    }

    Ok(sawstat)
}

fn parse_row(value: &str, now: DateTime<Utc>) -> Option<(u32, KeyingInfo)> {
    let mut fields = value.split_whitespace();
    let node: u32 = fields.next()?.parse().ok()?;
    let is_keyed = parse_flag(fields.next()?)?;
    let since_keyed: i64 = fields.next()?.parse().ok()?;
    let since_unkeyed: i64 = fields.next()?.parse().ok()?;

    let secs_since_keyed = u64::try_from(since_keyed).ok();
    // Outer None: offset too large to place in time, so the row is rejected.
    let at = |offset: i64| -> Option<Option<DateTime<Utc>>> {
        if offset < 0 {
            return Some(None);
        }
        ChronoDuration::try_seconds(offset)
            .and_then(|delta| now.checked_sub_signed(delta))
            .map(Some)
    };

    Some((
        node,
        KeyingInfo {
            is_keyed,
            secs_since_keyed,
            last_keyed_time: at(since_keyed)?,
            last_unkeyed_time: at(since_unkeyed)?,
        },
    ))
}
