//! Inputs to the state manager and how live events map onto them.
//!
//! Live link changes arrive as `VarSet` events:
//!
//! ```text
//! Event: VarSet
//! Variable: RPT_ALINKS
//! Value: 2,2000TK,2001RU
//! ```
//!
//! Every other event, and every response, is left alone.

use tracing::{debug, trace};

use nodelink_core::CombinedNodeStatus;
use nodelink_proto::{
    LinkList, Message, RX_KEYED_VAR, TX_KEYED_VAR, parse_flag, parse_rpt_alinks, parse_rpt_links,
};

/// Event name for channel variable changes.
pub const VARSET_EVENT: &str = "VarSet";

/// Variable listing linked nodes with mode only.
pub const RPT_LINKS_VAR: &str = "RPT_LINKS";

/// Variable listing linked nodes with mode and keyed state.
pub const RPT_ALINKS_VAR: &str = "RPT_ALINKS";

/// One input to the state manager.
///
/// The manager treats both variants the same way whichever producer sent
/// them.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// A polled snapshot.
    Snapshot(CombinedNodeStatus),
    /// A live message from the connector's feed.
    Message(Message),
}

impl From<CombinedNodeStatus> for StateUpdate {
    fn from(status: CombinedNodeStatus) -> Self {
        StateUpdate::Snapshot(status)
    }
}

impl From<Message> for StateUpdate {
    fn from(message: Message) -> Self {
        StateUpdate::Message(message)
    }
}

/// What a live message says about link state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Full link membership, with keyed flags when the list carried them.
    Links(LinkList),
    /// Local transmitter keyed state.
    LocalTx(bool),
    /// Local receiver keyed state.
    LocalRx(bool),
}

/// Interpret a live message. Returns `None` for anything irrelevant.
pub fn interpret(message: &Message) -> Option<Observation> {
    let Some(event) = message.event_name() else {
        trace!(kind = ?message.kind, "ignoring non-event message");
        return None;
    };
    if !event.eq_ignore_ascii_case(VARSET_EVENT) {
        trace!(event, "ignoring event");
        return None;
    }

    let variable = message.header("Variable")?;
    let value = message.header("Value").unwrap_or_default().trim();
    match variable {
        RPT_ALINKS_VAR => Some(Observation::Links(parse_rpt_alinks(value))),
        RPT_LINKS_VAR => Some(Observation::Links(parse_rpt_links(value))),
        TX_KEYED_VAR | RX_KEYED_VAR => {
            let Some(keyed) = parse_flag(value) else {
                debug!(variable, value, "ignoring malformed keyed flag");
                return None;
            };
            if variable == TX_KEYED_VAR {
                Some(Observation::LocalTx(keyed))
            } else {
                Some(Observation::LocalRx(keyed))
            }
        }
        _ => {
            trace!(variable, "ignoring variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodelink_core::LinkMode;
    use nodelink_proto::{Frame, classify};

    fn message(lines: &[&str]) -> Message {
        classify(Frame::from_lines(lines.iter().map(|l| l.to_string())))
    }

    #[test]
    fn alinks_event() {
        let msg = message(&["Event: VarSet", "Variable: RPT_ALINKS", "Value: 2,2000TK,2001RU"]);
        match interpret(&msg) {
            Some(Observation::Links(list)) => {
                assert_eq!(list.nodes.len(), 2);
                assert_eq!(list.nodes[0].keyed, Some(true));
                assert_eq!(list.nodes[1].mode, LinkMode::ReceiveOnly);
            }
            other => panic!("expected Links, got {other:?}"),
        }
    }

    #[test]
    fn links_event_has_no_keying() {
        let msg = message(&["Event: VarSet", "Variable: RPT_LINKS", "Value: 1,T2000"]);
        match interpret(&msg) {
            Some(Observation::Links(list)) => assert_eq!(list.nodes[0].keyed, None),
            other => panic!("expected Links, got {other:?}"),
        }
    }

    #[test]
    fn local_keying_events() {
        let tx = message(&["Event: VarSet", "Variable: RPT_TXKEYED", "Value: 1"]);
        let rx = message(&["Event: VarSet", "Variable: RPT_RXKEYED", "Value: 0"]);
        assert_eq!(interpret(&tx), Some(Observation::LocalTx(true)));
        assert_eq!(interpret(&rx), Some(Observation::LocalRx(false)));

        let bad = message(&["Event: VarSet", "Variable: RPT_TXKEYED", "Value: maybe"]);
        assert_eq!(interpret(&bad), None);
    }

    #[test]
    fn everything_else_is_ignored() {
        assert_eq!(interpret(&message(&["Event: Newchannel", "Channel: IAX2/1"])), None);
        assert_eq!(interpret(&message(&["Event: VarSet", "Variable: RPT_NUMLINKS", "Value: 2"])), None);
        assert_eq!(interpret(&message(&["Response: Success", "Message: Pong"])), None);
        assert_eq!(interpret(&message(&["Event: VarSet"])), None);
    }
}
