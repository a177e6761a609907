//! Identity and delivery types shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's session identifier, assigned by the relay at accept time.
///
/// Newtype over the `u16` that travels on the wire as `senderId`, so a
/// session id can't be confused with an object id in a signature.
/// Id 0 is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u16);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// Identifier of a networked physics object.
///
/// Assigned once at world setup (sequentially from 0) and never
/// renegotiated. Signed because the wire field is an `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub i32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DeliveryMode
// ---------------------------------------------------------------------------

/// The delivery guarantee for a message.
///
/// A spawn notification must arrive (reliable), but an avatar pose that is
/// re-sent every tick can afford to lose a few (unreliable): the next tick
/// supersedes it, and retransmitting would only add latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Guaranteed, order-preserved, retransmitted until acknowledged.
    Reliable,
    /// Best-effort: may be lost, duplicated away, or arrive out of order.
    Unreliable,
}

impl DeliveryMode {
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Reliable)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliable => write!(f, "reliable"),
            Self::Unreliable => write!(f, "unreliable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Specifies which sessions a server-side message is delivered to.
///
/// Relay handlers return `(Recipient, Message)` pairs and the server
/// resolves each recipient against its current session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connected session.
    All,

    /// One specific session.
    Session(SessionId),

    /// Every connected session except this one. The relay's fan-out uses
    /// this with the origin session, so a sender never hears its own echo.
    AllExcept(SessionId),
}

impl Recipient {
    /// Returns `true` if a session with the given id should receive the
    /// message.
    pub fn includes(&self, id: SessionId) -> bool {
        match *self {
            Self::All => true,
            Self::Session(target) => target == id,
            Self::AllExcept(excluded) => excluded != id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId(7).to_string(), "S-7");
    }

    #[test]
    fn test_object_id_display() {
        assert_eq!(ObjectId(-1).to_string(), "O--1");
        assert_eq!(ObjectId(3).to_string(), "O-3");
    }

    #[test]
    fn test_session_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&SessionId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_delivery_mode_is_reliable() {
        assert!(DeliveryMode::Reliable.is_reliable());
        assert!(!DeliveryMode::Unreliable.is_reliable());
    }

    #[test]
    fn test_recipient_all_includes_everyone() {
        assert!(Recipient::All.includes(SessionId(1)));
        assert!(Recipient::All.includes(SessionId(9)));
    }

    #[test]
    fn test_recipient_session_includes_only_target() {
        let r = Recipient::Session(SessionId(2));
        assert!(r.includes(SessionId(2)));
        assert!(!r.includes(SessionId(3)));
    }

    #[test]
    fn test_recipient_all_except_excludes_origin() {
        let r = Recipient::AllExcept(SessionId(4));
        assert!(!r.includes(SessionId(4)));
        assert!(r.includes(SessionId(5)));
    }
}
