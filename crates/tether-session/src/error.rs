//! Error types for the session layer.

use crate::CloseReason;

/// Errors that can occur while managing connection sessions.
///
/// None of these are fatal to the process: a failing session is torn down
/// and every other session carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The server already holds `max` sessions.
    #[error("server full ({max} sessions)")]
    ServerFull { max: usize },

    /// A send was attempted on a session that is not `Connected`.
    /// The message is dropped.
    #[error("send on a session that is not connected")]
    SendAfterDisconnect,

    /// Too many reliable frames are waiting for acknowledgement.
    #[error("reliable send queue full ({in_flight} frames in flight)")]
    SendQueueFull { in_flight: usize },

    /// The peer went silent, or stopped acknowledging reliable frames.
    #[error("connection timed out")]
    ConnectionTimedOut,

    /// The handshake never completed.
    #[error("connection failed: {0}")]
    ConnectionFailed(CloseReason),
}
