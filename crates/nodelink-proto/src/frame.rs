//! Frame decoding for the line-oriented management protocol.
//!
//! The controller sends `\r\n`-terminated `Key: Value` lines; a blank line
//! ends a frame. This module splits a byte buffer into frames without
//! performing any I/O, so partial reads can be accumulated by the caller
//! and decoded once a terminator arrives.
//!
//! ```text
//! Event: VarSet\r\n
//! Variable: RPT_ALINKS\r\n
//! Value: 1,2000TK\r\n
//! \r\n
//! ```

/// Line feed, the end of every protocol line (a preceding `\r` is optional).
pub const LINE_FEED: u8 = b'\n';

/// Upper bound on buffered bytes for a single frame.
///
/// Management frames are typically a few hundred bytes; a status dump for a
/// busy hub is a few kilobytes. Anything beyond this is treated as garbage.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// One blank-line-terminated block of protocol lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// `Key: Value` pairs in arrival order, duplicates included.
    pub pairs: Vec<(String, String)>,
    /// Every line of the frame verbatim (without line terminators).
    pub lines: Vec<String>,
}

impl Frame {
    /// Build a frame from lines, splitting each into a header pair when it
    /// has one.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frame = Frame::default();
        for line in lines {
            frame.push_line(line.into());
        }
        frame
    }

    /// Append a line, recording a header pair if it contains one.
    pub fn push_line(&mut self, line: String) {
        if let Some((key, value)) = split_header(&line) {
            self.pairs.push((key.to_string(), value.to_string()));
        }
        self.lines.push(line);
    }

    /// Whether the frame has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Split a `Key: Value` line at the first colon.
///
/// The key is trimmed; the value has surrounding whitespace trimmed.
/// Returns `None` for lines without a colon or with an empty key.
///
/// # Examples
///
/// ```
/// use nodelink_proto::frame::split_header;
///
/// assert_eq!(split_header("Event: VarSet"), Some(("Event", "VarSet")));
/// assert_eq!(split_header("Conn: 2000 10.0.0.1 0 OUT 00:00:05 ESTABLISHED"),
///            Some(("Conn", "2000 10.0.0.1 0 OUT 00:00:05 ESTABLISHED")));
/// assert_eq!(split_header("Asterisk Call Manager/1.1"), None);
/// ```
pub fn split_header(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}

/// Result of attempting to decode one frame from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete frame was decoded.
    Frame {
        /// The decoded frame.
        frame: Frame,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// Only blank lines were found before the data ran out; drop them.
    Blank(usize),

    /// The buffer does not yet contain a complete frame. More data is needed.
    Incomplete,
}

/// Decode one blank-line-terminated frame from a byte buffer.
///
/// Leading blank lines are skipped. Bytes that are not valid UTF-8 are
/// replaced rather than rejected, so one corrupted byte costs at most one
/// garbled line.
pub fn decode_frame(buf: &[u8]) -> DecodeResult {
    let mut frame = Frame::default();
    let mut start = 0;

    while let Some(offset) = buf[start..].iter().position(|&b| b == LINE_FEED) {
        let end = start + offset;
        let line = trim_line(&buf[start..end]);
        start = end + 1;

        if line.is_empty() {
            if frame.is_empty() {
                continue;
            }
            return DecodeResult::Frame {
                frame,
                consumed: start,
            };
        }

        frame.push_line(String::from_utf8_lossy(line).into_owned());
    }

    if frame.is_empty() && start > 0 {
        DecodeResult::Blank(start)
    } else {
        DecodeResult::Incomplete
    }
}

/// Decode one line (up to and including the line feed) from a byte buffer.
///
/// Used for the one-line banner the controller sends before any frame.
/// Returns the line and the number of bytes consumed.
pub fn decode_line(buf: &[u8]) -> Option<(String, usize)> {
    let end = buf.iter().position(|&b| b == LINE_FEED)?;
    let line = String::from_utf8_lossy(trim_line(&buf[..end])).into_owned();
    Some((line, end + 1))
}

/// Strip a trailing carriage return.
fn trim_line(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // split_header
    // -----------------------------------------------------------------------

    #[test]
    fn split_header_trims_value() {
        assert_eq!(split_header("Response:   Success  "), Some(("Response", "Success")));
    }

    #[test]
    fn split_header_keeps_later_colons_in_value() {
        assert_eq!(
            split_header("IP: 10.0.0.5:667"),
            Some(("IP", "10.0.0.5:667"))
        );
    }

    #[test]
    fn split_header_empty_value() {
        assert_eq!(split_header("Message:"), Some(("Message", "")));
    }

    #[test]
    fn split_header_rejects_non_headers() {
        assert_eq!(split_header(": value"), None);
        assert_eq!(split_header("no colon here"), None);
        assert_eq!(split_header("two words: value"), None);
    }

    // -----------------------------------------------------------------------
    // decode_frame
    // -----------------------------------------------------------------------

    #[test]
    fn decode_empty_buffer() {
        assert_eq!(decode_frame(b""), DecodeResult::Incomplete);
    }

    #[test]
    fn decode_without_terminator_is_incomplete() {
        assert_eq!(
            decode_frame(b"Event: VarSet\r\nVariable: RPT_TXKEYED\r\n"),
            DecodeResult::Incomplete
        );
    }

    #[test]
    fn decode_partial_line_is_incomplete() {
        assert_eq!(decode_frame(b"Event: Var"), DecodeResult::Incomplete);
    }

    #[test]
    fn decode_complete_frame() {
        let buf = b"Response: Success\r\nActionID: nl-1\r\n\r\nEvent: Next";
        match decode_frame(buf) {
            DecodeResult::Frame { frame, consumed } => {
                assert_eq!(consumed, 37);
                assert_eq!(frame.lines, vec!["Response: Success", "ActionID: nl-1"]);
                assert_eq!(
                    frame.pairs,
                    vec![
                        ("Response".to_string(), "Success".to_string()),
                        ("ActionID".to_string(), "nl-1".to_string()),
                    ]
                );
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_bare_line_feeds() {
        match decode_frame(b"Event: A\nKey: B\n\n") {
            DecodeResult::Frame { frame, consumed } => {
                assert_eq!(consumed, 17);
                assert_eq!(frame.lines.len(), 2);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_skips_leading_blank_lines() {
        match decode_frame(b"\r\n\r\nEvent: A\r\n\r\n") {
            DecodeResult::Frame { frame, consumed } => {
                assert_eq!(consumed, 16);
                assert_eq!(frame.lines, vec!["Event: A"]);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_only_blank_lines() {
        assert_eq!(decode_frame(b"\r\n\r\n"), DecodeResult::Blank(4));
        assert_eq!(decode_frame(b"\r\nEvent"), DecodeResult::Blank(2));
    }

    #[test]
    fn decode_keeps_non_header_lines_raw_only() {
        match decode_frame(b"Response: Follows\r\nsome free text\r\n--END COMMAND--\r\n\r\n") {
            DecodeResult::Frame { frame, .. } => {
                assert_eq!(frame.pairs.len(), 1);
                assert_eq!(frame.lines.len(), 3);
                assert_eq!(frame.lines[2], "--END COMMAND--");
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_invalid_utf8_is_lossy() {
        match decode_frame(b"Event: V\xFFarSet\r\n\r\n") {
            DecodeResult::Frame { frame, .. } => {
                assert_eq!(frame.pairs[0].0, "Event");
                assert!(frame.pairs[0].1.contains('\u{FFFD}'));
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_line_banner() {
        assert_eq!(
            decode_line(b"Asterisk Call Manager/1.1\r\nResponse"),
            Some(("Asterisk Call Manager/1.1".to_string(), 27))
        );
        assert_eq!(decode_line(b"Asterisk Call"), None);
    }

    #[test]
    fn frame_from_lines() {
        let frame = Frame::from_lines(["Event: VarSet", "Value: 1"]);
        assert_eq!(frame.pairs.len(), 2);
        assert!(!frame.is_empty());
    }
}
