//! The message envelope: a type id, a delivery mode, and a field payload.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ id: u16 (LE) │ fields, in append order ...  │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! The delivery mode is not part of these bytes. It rides in the transport
//! frame header, so the transport knows it before anything is sent.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    ClientToServerId, DeliveryMode, ProtocolError, ServerToClientId,
    codec::{MessageReader, WireEncode},
};

/// Bumped whenever any message's field layout changes. Exchanged in the
/// connection handshake; peers with different versions never talk.
pub const PROTOCOL_VERSION: u16 = 1;

/// Largest finished envelope, header included. Keeps every envelope
/// inside one datagram on a typical MTU.
pub const MAX_MESSAGE_SIZE: usize = 1200;

/// Size of the id header in front of the payload.
pub const HEADER_SIZE: usize = 2;

/// An outbound envelope under construction.
///
/// Fields are appended with [`add`](Self::add) (consuming, for chains) or
/// [`push`](Self::push) (in place, for loops). The first encode error is
/// remembered and reported by [`finalize`](Self::finalize), so a chain
/// never has to check each step.
///
/// ```
/// use tether_protocol::{ClientToServerId, Message, Pose};
///
/// let bytes = Message::client(ClientToServerId::UpdateAvatarTransform)
///     .add(Pose::default())
///     .finalize()
///     .unwrap();
/// assert_eq!(bytes.len(), 2 + 7 * 4);
/// ```
#[derive(Debug, Clone)]
pub struct Message {
    id: u16,
    mode: DeliveryMode,
    buf: BytesMut,
    error: Option<ProtocolError>,
}

impl Message {
    /// Starts an empty envelope with an explicit id and mode.
    pub fn create(mode: DeliveryMode, id: impl Into<u16>) -> Self {
        let id = id.into();
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16_le(id);
        Self {
            id,
            mode,
            buf,
            error: None,
        }
    }

    /// Starts a client→server envelope using the id's intrinsic mode.
    pub fn client(id: ClientToServerId) -> Self {
        Self::create(id.mode(), id)
    }

    /// Starts a server→client envelope using the id's intrinsic mode.
    pub fn server(id: ServerToClientId) -> Self {
        Self::create(id.mode(), id)
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Current envelope size in bytes, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` when no fields have been appended yet.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == HEADER_SIZE
    }

    /// Appends one field and returns the envelope.
    pub fn add(mut self, value: impl WireEncode) -> Self {
        self.push(value);
        self
    }

    /// Appends one field in place.
    pub fn push(&mut self, value: impl WireEncode) -> &mut Self {
        if self.error.is_none() {
            if let Err(e) = value.encode(&mut self.buf) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Seals the envelope into wire bytes.
    ///
    /// Fails if any append failed, if the id is the reserved 0, or if the
    /// result exceeds [`MAX_MESSAGE_SIZE`].
    pub fn finalize(self) -> Result<EncodedMessage, ProtocolError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.id == 0 {
            return Err(ProtocolError::InvalidMessage(
                "message id 0 is reserved".into(),
            ));
        }
        if self.buf.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(EncodedMessage {
            id: self.id,
            mode: self.mode,
            bytes: self.buf.freeze(),
        })
    }

    /// Splits received envelope bytes into the type id and a reader over
    /// the payload fields.
    pub fn parse(bytes: impl Into<Bytes>) -> Result<(u16, MessageReader), ProtocolError> {
        let mut reader = MessageReader::new(bytes);
        let id = reader.read::<u16>()?;
        if id == 0 {
            return Err(ProtocolError::UnknownMessageType(0));
        }
        Ok((id, reader))
    }
}

/// A finished envelope. Cheap to clone: fan-out to many sessions shares
/// one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    id: u16,
    mode: DeliveryMode,
    bytes: Bytes,
}

impl EncodedMessage {
    /// Wraps envelope bytes that arrived from the network so they can be
    /// forwarded without re-encoding.
    pub fn from_wire(mode: DeliveryMode, bytes: Bytes) -> Result<Self, ProtocolError> {
        let (id, _) = Message::parse(bytes.clone())?;
        Ok(Self { id, mode, bytes })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
