//! Shared helpers for the response-body block parsers.
//!
//! Bodies are the raw lines of a response frame joined with `\n`. Parsers
//! walk them line by line and never fail the whole body because of a
//! single bad line.

use nodelink_core::error::{Error, Result};

use crate::frame::split_header;

/// Iterate the `Key: Value` lines of a body, skipping anything else.
pub fn header_lines(body: &str) -> impl Iterator<Item = (&str, &str)> {
    body.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(split_header)
}

/// Fail if the body is an error response.
///
/// Returns [`Error::Protocol`] carrying the response's `Message` when the
/// body contains `Response: Error`.
pub fn check_error(body: &str) -> Result<()> {
    let mut is_error = false;
    let mut message = None;
    for (key, value) in header_lines(body) {
        if key.eq_ignore_ascii_case("Response") && value.eq_ignore_ascii_case("Error") {
            is_error = true;
        } else if key.eq_ignore_ascii_case("Message") {
            message = Some(value);
        }
    }

    if is_error {
        Err(Error::Protocol(format!(
            "error response: {}",
            message.unwrap_or("no message")
        )))
    } else {
        Ok(())
    }
}

/// Parse a `0`/`1` keyed flag.
pub fn parse_flag(text: &str) -> Option<bool> {
    match text {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lines_skip_free_text() {
        let body = "Response: Success\r\nfree text\nNode: 1999";
        let lines: Vec<_> = header_lines(body).collect();
        assert_eq!(lines, vec![("Response", "Success"), ("Node", "1999")]);
    }

    #[test]
    fn check_error_passes_success() {
        assert!(check_error("Response: Success\nNode: 1999").is_ok());
        assert!(check_error("").is_ok());
    }

    #[test]
    fn check_error_reports_message() {
        let err = check_error("Response: Error\nMessage: Invalid node").unwrap_err();
        match err {
            Error::Protocol(msg) => assert!(msg.contains("Invalid node"), "{msg}"),
            other => panic!("expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn parse_flag_values() {
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("yes"), None);
    }
}
