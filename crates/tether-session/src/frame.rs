//! Transport frames: the outermost layer of every datagram.
//!
//! ```text
//! ┌───────────┬─────────────────────────────────────┐
//! │ kind: u8  │ kind-specific fields                │
//! └───────────┴─────────────────────────────────────┘
//!
//! 0x01 Connect     version: u16, nonce: u32
//! 0x02 Accept      session id: u16, nonce: u32
//! 0x03 Reject      reason: u8
//! 0x04 Disconnect
//! 0x05 Heartbeat
//! 0x06 Unreliable  envelope bytes
//! 0x07 Reliable    seq: u16, envelope bytes
//! 0x08 Ack         seq: u16
//! ```
//!
//! The envelope inside `Unreliable`/`Reliable` is opaque at this layer.
//!
//! The client picks a fresh random nonce for every connection attempt and
//! the server echoes it in `Accept`. A `Connect` repeating the nonce of a
//! live session is a retry after a lost `Accept`; a different nonce from
//! the same address is a new connection.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tether_protocol::{MessageReader, ProtocolError, SessionId};

/// Why a server turned a `Connect` away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectReason {
    ServerFull = 1,
    VersionMismatch = 2,
}

impl TryFrom<u8> for RejectReason {
    type Error = ProtocolError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::ServerFull),
            2 => Ok(Self::VersionMismatch),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown reject reason {other}"
            ))),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerFull => write!(f, "server full"),
            Self::VersionMismatch => write!(f, "protocol version mismatch"),
        }
    }
}

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Connect { version: u16, nonce: u32 },
    Accept { session_id: SessionId, nonce: u32 },
    Reject { reason: RejectReason },
    Disconnect,
    Heartbeat,
    Unreliable { envelope: Bytes },
    Reliable { seq: u16, envelope: Bytes },
    Ack { seq: u16 },
}

const CONNECT: u8 = 0x01;
const ACCEPT: u8 = 0x02;
const REJECT: u8 = 0x03;
const DISCONNECT: u8 = 0x04;
const HEARTBEAT: u8 = 0x05;
const UNRELIABLE: u8 = 0x06;
const RELIABLE: u8 = 0x07;
const ACK: u8 = 0x08;

impl Frame {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        match self {
            Self::Connect { version, nonce } => {
                buf.put_u8(CONNECT);
                buf.put_u16_le(*version);
                buf.put_u32_le(*nonce);
            }
            Self::Accept { session_id, nonce } => {
                buf.put_u8(ACCEPT);
                buf.put_u16_le(session_id.0);
                buf.put_u32_le(*nonce);
            }
            Self::Reject { reason } => {
                buf.put_u8(REJECT);
                buf.put_u8(*reason as u8);
            }
            Self::Disconnect => buf.put_u8(DISCONNECT),
            Self::Heartbeat => buf.put_u8(HEARTBEAT),
            Self::Unreliable { envelope } => {
                buf.reserve(1 + envelope.len());
                buf.put_u8(UNRELIABLE);
                buf.put_slice(envelope);
            }
            Self::Reliable { seq, envelope } => {
                buf.reserve(3 + envelope.len());
                buf.put_u8(RELIABLE);
                buf.put_u16_le(*seq);
                buf.put_slice(envelope);
            }
            Self::Ack { seq } => {
                buf.put_u8(ACK);
                buf.put_u16_le(*seq);
            }
        }
        buf.freeze()
    }

    pub fn decode(data: Bytes) -> Result<Self, ProtocolError> {
        let mut reader = MessageReader::new(data);
        let kind = reader.read::<u8>()?;
        let frame = match kind {
            CONNECT => Self::Connect {
                version: reader.read()?,
                nonce: reader.read()?,
            },
            ACCEPT => Self::Accept {
                session_id: reader.read()?,
                nonce: reader.read()?,
            },
            REJECT => Self::Reject {
                reason: RejectReason::try_from(reader.read::<u8>()?)?,
            },
            DISCONNECT => Self::Disconnect,
            HEARTBEAT => Self::Heartbeat,
            UNRELIABLE => Self::Unreliable {
                envelope: reader.into_remaining(),
            },
            RELIABLE => {
                let seq = reader.read()?;
                Self::Reliable {
                    seq,
                    envelope: reader.into_remaining(),
                }
            }
            ACK => Self::Ack {
                seq: reader.read()?,
            },
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "unknown frame kind {other:#04x}"
                )));
            }
        };
        Ok(frame)
    }

    /// Short name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::Disconnect => "disconnect",
            Self::Heartbeat => "heartbeat",
            Self::Unreliable { .. } => "unreliable",
            Self::Reliable { .. } => "reliable",
            Self::Ack { .. } => "ack",
        }
    }
}
