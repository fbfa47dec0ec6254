//! Connector lifecycle states.

use std::fmt;

/// Where the connector is in its session lifecycle.
///
/// ```text
/// Disconnected -> Connecting -> LoggingIn -> Ready
///       ^______________|____________|__________|   (any I/O error)
/// ```
///
/// [`Stopped`](ConnectorState::Stopped) is terminal and only entered on
/// caller-initiated shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    /// No session; waiting out the backoff delay.
    Disconnected,
    /// Dialing the controller.
    Connecting,
    /// Connected; waiting for the banner and the login response.
    LoggingIn,
    /// Logged in; messages flow to the feed and requests are accepted.
    Ready,
    /// Shut down by the caller.
    Stopped,
}

impl ConnectorState {
    /// Whether requests can be sent.
    pub fn is_ready(self) -> bool {
        self == ConnectorState::Ready
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorState::Disconnected => "disconnected",
            ConnectorState::Connecting => "connecting",
            ConnectorState::LoggingIn => "logging-in",
            ConnectorState::Ready => "ready",
            ConnectorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
