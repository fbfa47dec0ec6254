//! Fixed-window coalescing of transmit edges.

use std::time::Duration;

use tokio::time::Instant;

use nodelink_core::TxEvent;

/// Collects transmit edges until its window closes.
///
/// The window opens with the first edge pushed into an empty batch and
/// closes `window` later, however many edges arrive in between. Edges come
/// back out in push order.
#[derive(Debug)]
pub struct TxBatcher {
    window: Duration,
    events: Vec<TxEvent>,
    deadline: Option<Instant>,
}

impl TxBatcher {
    /// A batcher with the given window width.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: Vec::new(),
            deadline: None,
        }
    }

    /// Queue an edge observed at `now`.
    pub fn push(&mut self, event: TxEvent, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
        self.events.push(event);
    }

    /// When the open window closes, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Take the queued edges and close the window.
    ///
    /// Returns `None` when nothing is queued.
    pub fn take(&mut self) -> Option<Vec<TxEvent>> {
        self.deadline = None;
        if self.events.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.events))
        }
    }
}
