//! Message classification: [`Frame`] to [`Message`].
//!
//! A frame with an `Event` header is an event, one with a `Response` header
//! is a response, and anything else is unknown. Missing headers are a
//! normal case, never an error.

use std::collections::HashMap;

use crate::frame::Frame;

/// Header naming an unsolicited event.
pub const EVENT_HEADER: &str = "Event";

/// Header carrying a response status (`Success`, `Error`, `Follows`, ...).
pub const RESPONSE_HEADER: &str = "Response";

/// Header correlating a response with the action that caused it.
pub const ACTION_ID_HEADER: &str = "ActionID";

/// Classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Unsolicited event (`Event:` header present).
    Event,
    /// Reply to an action (`Response:` header present).
    Response,
    /// Neither header present.
    Unknown,
}

/// A classified protocol message.
///
/// Header keys keep their original case. When a key repeats inside one
/// frame, the last value wins in [`headers`](Message::headers); every
/// occurrence is still available through [`raw`](Message::raw).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Event, response, or unknown.
    pub kind: MessageKind,
    /// Header map, last value wins.
    pub headers: HashMap<String, String>,
    /// The frame's lines verbatim.
    pub raw: Vec<String>,
}

impl Message {
    /// Look up a header value.
    ///
    /// Tries an exact key match first, then an ASCII case-insensitive one,
    /// since controllers are not consistent about `ActionID` vs `ActionId`.
    pub fn header(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(key) {
            return Some(value);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The event name, for event messages.
    pub fn event_name(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Event => self.header(EVENT_HEADER),
            _ => None,
        }
    }

    /// The response status, for response messages.
    pub fn response_status(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Response => self.header(RESPONSE_HEADER),
            _ => None,
        }
    }

    /// The correlation id, if present.
    pub fn action_id(&self) -> Option<&str> {
        self.header(ACTION_ID_HEADER)
    }

    /// Whether this is a response whose status is not `Error`.
    ///
    /// `Success`, `Follows`, and `Goodbye` all count as success.
    pub fn is_success(&self) -> bool {
        self.response_status()
            .is_some_and(|status| !status.eq_ignore_ascii_case("error"))
    }

    /// The frame's lines joined with `\n`, for the block parsers.
    pub fn body(&self) -> String {
        self.raw.join("\n")
    }
}

/// Classify a frame into a message.
pub fn classify(frame: Frame) -> Message {
    let mut headers = HashMap::with_capacity(frame.pairs.len());
    for (key, value) in frame.pairs {
        headers.insert(key, value);
    }

    let has = |name: &str| headers.keys().any(|k| k.eq_ignore_ascii_case(name));
    let kind = if has(EVENT_HEADER) {
        MessageKind::Event
    } else if has(RESPONSE_HEADER) {
        MessageKind::Response
    } else {
        MessageKind::Unknown
    };

    Message {
        kind,
        headers,
        raw: frame.lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(lines: &[&str]) -> Message {
        classify(Frame::from_lines(lines.iter().copied()))
    }

    #[test]
    fn classify_event() {
        let msg = message(&["Event: VarSet", "Variable: RPT_TXKEYED", "Value: 1"]);
        assert_eq!(msg.kind, MessageKind::Event);
        assert_eq!(msg.event_name(), Some("VarSet"));
        assert_eq!(msg.header("Variable"), Some("RPT_TXKEYED"));
        assert_eq!(msg.response_status(), None);
    }

    #[test]
    fn classify_response() {
        let msg = message(&["Response: Success", "ActionID: nl-7", "Ping: Pong"]);
        assert_eq!(msg.kind, MessageKind::Response);
        assert_eq!(msg.action_id(), Some("nl-7"));
        assert!(msg.is_success());
        assert_eq!(msg.event_name(), None);
    }

    #[test]
    fn event_wins_over_response() {
        let msg = message(&["Response: Success", "Event: FullyBooted"]);
        assert_eq!(msg.kind, MessageKind::Event);
    }

    #[test]
    fn classify_unknown() {
        let msg = message(&["Privilege: system,all", "Status: Fully Booted"]);
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert!(!msg.is_success());
        assert_eq!(msg.action_id(), None);
    }

    #[test]
    fn duplicate_keys_last_value_wins() {
        let msg = message(&[
            "Response: Success",
            "Conn: 2000 10.0.0.1 0 OUT 00:00:01 ESTABLISHED",
            "Conn: 2001 10.0.0.2 1 IN 00:00:02 ESTABLISHED",
        ]);
        assert_eq!(
            msg.header("Conn"),
            Some("2001 10.0.0.2 1 IN 00:00:02 ESTABLISHED")
        );
        assert_eq!(msg.raw.len(), 3);
    }

    #[test]
    fn header_lookup_falls_back_to_case_insensitive() {
        let msg = message(&["Response: Success", "ActionId: nl-3"]);
        assert_eq!(msg.action_id(), Some("nl-3"));
        assert!(msg.headers.contains_key("ActionId"));
    }

    #[test]
    fn error_response_is_not_success() {
        let msg = message(&["Response: Error", "Message: Authentication failed"]);
        assert!(!msg.is_success());
        assert_eq!(msg.header("Message"), Some("Authentication failed"));
    }

    #[test]
    fn body_joins_raw_lines() {
        let msg = message(&["Response: Success", "Node: 1999"]);
        assert_eq!(msg.body(), "Response: Success\nNode: 1999");
    }
}
