//! # tether-protocol
//!
//! Wire format for Tether. Defines how field values become bytes
//! ([`codec`]), how fields become a typed envelope ([`Message`]), and which
//! message ids exist in each direction ([`ClientToServerId`],
//! [`ServerToClientId`]).
//!
//! This crate is pure: no sockets, no clocks, no async. Everything above
//! it (sessions, relay, client) moves [`EncodedMessage`] bytes around and
//! asks this crate what they mean.

pub mod codec;
mod error;
mod ids;
mod math;
mod message;
mod messages;
mod types;

pub use codec::{MAX_STRING_LEN, MessageReader, WireDecode, WireEncode};
pub use error::ProtocolError;
pub use ids::{ClientToServerId, ServerToClientId};
pub use math::{Pose, Quat, Vec2, Vec3};
pub use message::{EncodedMessage, HEADER_SIZE, MAX_MESSAGE_SIZE, Message, PROTOCOL_VERSION};
pub use messages::{ClientMessage, ServerMessage};
pub use types::{DeliveryMode, ObjectId, Recipient, SessionId};
