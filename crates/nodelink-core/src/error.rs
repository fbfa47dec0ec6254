//! Error types for nodelink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Socket, protocol, login, and
//! collaborator failures are all captured here.

/// The error type for all nodelink operations.
///
/// Variants cover the failure modes met when talking to a repeater
/// controller over its management interface: socket failures, malformed
/// frames, rejected logins, timeouts, and errors reported by the
/// persistence or lookup collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect, read, or write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed frame, error response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the controller.
    #[error("timeout waiting for response")]
    Timeout,

    /// No session to the controller is currently established.
    #[error("not connected")]
    NotConnected,

    /// The session to the controller was lost unexpectedly.
    ///
    /// Requests that were in flight when the socket dropped fail with this.
    #[error("connection lost")]
    ConnectionLost,

    /// The controller refused the login credentials. The connector keeps
    /// retrying with backoff.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// The component was shut down by its owner.
    #[error("shut down")]
    Shutdown,

    /// The persistence collaborator failed to record a link.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The lookup collaborator failed to resolve a node.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// An invalid parameter was passed to a builder or constructor.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is transient and should be retried via backoff.
    ///
    /// Socket errors, timeouts, and login rejections are transient. Nothing
    /// in nodelink is fatal to the process; only [`Error::Shutdown`] ends a
    /// connector for good.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Timeout
                | Error::NotConnected
                | Error::ConnectionLost
                | Error::LoginRejected(_)
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
