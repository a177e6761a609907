//! Error types for the protocol layer.
//!
//! Each crate in Tether defines its own error enum. A `ProtocolError`
//! always means "these bytes could not be turned into (or out of) a
//! message", never a networking or session problem.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A read ran past the end of the buffer.
    ///
    /// The message is discarded as a whole; the reader is left exactly
    /// where it was before the failed read.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    TruncatedMessage {
        /// Bytes the failed read required.
        needed: usize,
        /// Bytes that were actually left in the buffer.
        remaining: usize,
    },

    /// The message-type identifier is not part of this protocol version
    /// (or is the reserved id 0).
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// The finished envelope would not fit in a single datagram, or a
    /// string is longer than its length prefix can describe.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size the envelope (or string) would have had.
        size: usize,
        /// The applicable limit.
        max: usize,
    },

    /// The message is well-formed bytes but violates a protocol rule,
    /// e.g. an envelope built with the reserved id 0.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
