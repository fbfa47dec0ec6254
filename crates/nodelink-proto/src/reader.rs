//! Async frame reader over any byte stream.
//!
//! [`FrameReader`] accumulates partial reads in a buffer and hands out one
//! [`Frame`] per blank-line terminator. It never retries the stream: EOF
//! and read errors end the reader, and its owner decides whether to
//! reconnect.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use nodelink_core::error::{Error, Result};

use crate::frame::{self, DecodeResult, Frame, MAX_FRAME_BYTES};

/// Size of each socket read.
const READ_CHUNK: usize = 4096;

/// Reads frames from an [`AsyncRead`] stream.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    /// Set after an oversized frame; the rest of it is dropped up to the
    /// next blank line.
    discarding: bool,
    /// The buffer was cleared part-way through a line, so the next line
    /// feed ends that line rather than a blank one.
    mid_line: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            discarding: false,
            mid_line: false,
        }
    }

    /// Read a single line, e.g. the controller's greeting banner.
    ///
    /// Returns `Ok(None)` on EOF before a full line arrived.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some((line, consumed)) = frame::decode_line(&self.buf) {
                self.buf.drain(..consumed);
                return Ok(Some(line));
            }
            if self.buf.len() > MAX_FRAME_BYTES {
                self.buf.clear();
                return Err(Error::Protocol("line too long".into()));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` on a clean EOF. A partial frame left in the
    /// buffer at EOF is dropped.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.decode_buffered() {
                return Ok(Some(frame));
            }
            if !self.fill().await? {
                if !self.buf.is_empty() {
                    trace!(bytes = self.buf.len(), "dropping partial frame at EOF");
                }
                return Ok(None);
            }
        }
    }

    /// Consume the reader and return the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Decode frames already in the buffer, skipping blank lines and the
    /// tail of any discarded frame.
    fn decode_buffered(&mut self) -> Option<Frame> {
        if self.discarding && !self.skip_discarded() {
            return None;
        }
        loop {
            match frame::decode_frame(&self.buf) {
                DecodeResult::Frame { frame, consumed } => {
                    self.buf.drain(..consumed);
                    return Some(frame);
                }
                DecodeResult::Blank(consumed) => {
                    self.buf.drain(..consumed);
                }
                DecodeResult::Incomplete => {
                    if self.buf.len() > MAX_FRAME_BYTES {
                        warn!(len = self.buf.len(), "frame buffer overflow, resyncing");
                        self.start_discard();
                    }
                    return None;
                }
            }
        }
    }

    /// Drop lines of an oversized frame up to and including its blank
    /// terminator. Returns `true` once the terminator has been consumed.
    fn skip_discarded(&mut self) -> bool {
        let mut dropped = 0usize;
        while let Some((line, consumed)) = frame::decode_line(&self.buf) {
            self.buf.drain(..consumed);
            if self.mid_line {
                self.mid_line = false;
            } else if line.is_empty() {
                self.discarding = false;
                trace!(lines = dropped, "discarded tail of oversized frame");
                return true;
            }
            dropped += 1;
        }
        if self.buf.len() > MAX_FRAME_BYTES {
            self.start_discard();
        }
        false
    }

    fn start_discard(&mut self) {
        self.mid_line = self.buf.last() != Some(&b'\n');
        self.buf.clear();
        self.discarding = true;
    }

    /// Read more bytes into the buffer. Returns `false` on EOF.
    async fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.inner.read(&mut chunk).await.map_err(map_read_error)?;
        if n == 0 {
            return Ok(false);
        }
        trace!(bytes = n, "read from stream");
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }
}

/// Map a read error to the appropriate [`Error`] variant.
fn map_read_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_frames_across_partial_writes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(client);

        let writer = tokio::spawn(async move {
            // Split mid-line and mid-terminator.
            for chunk in [
                &b"Event: Var"[..],
                b"Set\r\nVariable: RPT_TXKEYED\r",
                b"\nValue: 1\r\n\r",
                b"\nResponse: Success\r\n\r\n",
            ] {
                server.write_all(chunk).await.unwrap();
                server.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(
            first.lines,
            vec!["Event: VarSet", "Variable: RPT_TXKEYED", "Value: 1"]
        );
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second.lines, vec!["Response: Success"]);

        writer.await.unwrap();
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn banner_then_frames() {
        let data: &[u8] = b"Asterisk Call Manager/1.0\r\nResponse: Success\r\nMessage: Authentication accepted\r\n\r\n";
        let mut reader = FrameReader::new(data);

        let banner = reader.read_line().await.unwrap();
        assert_eq!(banner.as_deref(), Some("Asterisk Call Manager/1.0"));

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.lines.len(), 2);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_drops_partial_frame() {
        let data: &[u8] = b"Event: A\r\n\r\nEvent: B\r\n";
        let mut reader = FrameReader::new(data);
        assert!(reader.next_frame().await.unwrap().is_some());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_line_eof() {
        let data: &[u8] = b"no newline";
        let mut reader = FrameReader::new(data);
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_discarded_and_stream_resyncs() {
        let mut data = Vec::new();
        data.extend_from_slice(b"Event: Huge\r\n");
        while data.len() <= MAX_FRAME_BYTES + READ_CHUNK {
            data.extend_from_slice(b"Filler: xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\r\n");
        }
        data.extend_from_slice(b"\r\nEvent: After\r\n\r\n");

        let mut reader = FrameReader::new(&data[..]);
        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.lines, vec!["Event: After"]);
    }

    /// An oversized frame body of exactly `len` bytes, ending on a line
    /// boundary when `whole_lines` is set.
    fn oversized_body(len: usize, whole_lines: bool) -> Vec<u8> {
        let mut data = b"Event: Huge\r\n".to_vec();
        let filler = b"Filler: xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\r\n";
        while data.len() + filler.len() + 8 < len {
            data.extend_from_slice(filler);
        }
        data.extend_from_slice(b"X: ");
        let tail = if whole_lines { 2 } else { 0 };
        data.resize(len - tail, b'x');
        if whole_lines {
            data.extend_from_slice(b"\r\n");
        }
        data
    }

    /// Feed `body` in one go, then `rest` once the reader has overflowed.
    async fn resync_after(body: Vec<u8>, rest: &'static [u8]) -> Frame {
        let (client, mut server) = tokio::io::duplex(4 * MAX_FRAME_BYTES);
        server.write_all(&body).await.unwrap();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            server.write_all(rest).await.unwrap();
            server
        });
        let mut reader = FrameReader::new(client);
        let frame = tokio::time::timeout(Duration::from_secs(2), reader.next_frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        drop(writer.await.unwrap());
        frame
    }

    #[tokio::test]
    async fn overflow_cut_at_line_end_honours_following_terminator() {
        // Reads are READ_CHUNK sized, so the overflow clear lands exactly on
        // the last line feed of the body.
        let body = oversized_body(17 * READ_CHUNK, true);
        let frame = resync_after(body, b"\r\nEvent: After\r\n\r\n").await;
        assert_eq!(frame.lines, vec!["Event: After"]);
    }

    #[tokio::test]
    async fn overflow_cut_mid_line_ignores_the_line_remainder() {
        let body = oversized_body(17 * READ_CHUNK, false);
        let frame = resync_after(body, b"xx\r\nFiller: x\r\n\r\nEvent: After\r\n\r\n").await;
        assert_eq!(frame.lines, vec!["Event: After"]);
    }

    #[test]
    fn read_errors_map_to_connection_lost() {
        let e = map_read_error(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(e, Error::ConnectionLost));

        let e = map_read_error(std::io::Error::other("odd"));
        assert!(matches!(e, Error::Io(_)));
    }
}
