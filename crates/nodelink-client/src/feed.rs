//! The connector's outbound stream of classified messages.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use nodelink_proto::Message;

/// Receiving end of the connector's message feed.
///
/// Messages arrive in socket order across reconnects. Once the connector
/// has been shut down, [`recv`](MessageFeed::recv) returns `None` even if
/// messages are still buffered.
#[derive(Debug)]
pub struct MessageFeed {
    rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl MessageFeed {
    pub(crate) fn new(rx: mpsc::Receiver<Message>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Wait for the next message. Returns `None` after shutdown.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Take a message if one is buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }
}
