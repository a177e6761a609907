//! Binary wire codec for primitive and composite field values.
//!
//! Every field type implements [`WireEncode`] (append to a buffer) and
//! [`WireDecode`] (read from a [`MessageReader`]). There is no schema on
//! the wire: a message is just its fields laid end to end, so the reader
//! must ask for exactly the types the writer appended, in the same order.
//!
//! ```text
//! f32  → 4 bytes, little-endian
//! u16  → 2 bytes, little-endian
//! str  → u16 length prefix + UTF-8 bytes
//! Vec3 → f32 x, f32 y, f32 z
//! Quat → f32 x, f32 y, f32 z, f32 w
//! ```
//!
//! Composite types are pure compositions of the primitive encoders; they
//! hold no state of their own.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    ObjectId, ProtocolError, SessionId,
    math::{Pose, Quat, Vec2, Vec3},
};

/// Longest string (in bytes) a `u16` length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// A value that can be appended to a message buffer.
///
/// Encoding only fails for values that can't be described on the wire
/// at all (a string longer than [`MAX_STRING_LEN`]).
pub trait WireEncode {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;
}

/// A value that can be read back from a message buffer.
pub trait WireDecode: Sized {
    /// Reads one value. Implementations may consume part of the buffer
    /// before failing; [`MessageReader::read`] rewinds on error.
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError>;
}

/// References encode like the value they point to, so both
/// `msg.add(pose)` and `msg.add(&name)` work.
impl<T: WireEncode + ?Sized> WireEncode for &T {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        (**self).encode(buf)
    }
}

// ---------------------------------------------------------------------------
// MessageReader
// ---------------------------------------------------------------------------

/// Cursor over a received message's fields.
///
/// Backed by [`Bytes`], so cloning a reader (or checkpointing it) is a
/// reference-count bump, not a copy.
#[derive(Debug, Clone)]
pub struct MessageReader {
    buf: Bytes,
}

impl MessageReader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    /// Reads the next field as a `T`.
    ///
    /// On failure the cursor is restored to where it was before the call,
    /// so the reader is never left pointing into the middle of a field.
    pub fn read<T: WireDecode>(&mut self) -> Result<T, ProtocolError> {
        let checkpoint = self.buf.clone();
        T::decode(self).inspect_err(|_| self.buf = checkpoint)
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns `true` once every field has been read.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The unread bytes, without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the reader and returns every unread byte.
    pub fn into_remaining(self) -> Bytes {
        self.buf
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::TruncatedMessage {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

// One encode/decode pair per fixed-width primitive. The `ensure` check
// happens before `get_*`, because `Buf::get_*` panics on short input.
macro_rules! impl_wire_primitive {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl WireEncode for $ty {
                fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
                    buf.$put(*self);
                    Ok(())
                }
            }

            impl WireDecode for $ty {
                fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
                    reader.ensure(std::mem::size_of::<$ty>())?;
                    Ok(reader.buf.$get())
                }
            }
        )*
    };
}

impl_wire_primitive! {
    u8 => put_u8, get_u8;
    i8 => put_i8, get_i8;
    u16 => put_u16_le, get_u16_le;
    i16 => put_i16_le, get_i16_le;
    u32 => put_u32_le, get_u32_le;
    i32 => put_i32_le, get_i32_le;
    f32 => put_f32_le, get_f32_le;
}

impl WireEncode for bool {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }
}

impl WireDecode for bool {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(reader.read::<u8>()? != 0)
    }
}

impl WireEncode for str {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = u16::try_from(self.len()).map_err(|_| {
            ProtocolError::MessageTooLarge {
                size: self.len(),
                max: MAX_STRING_LEN,
            }
        })?;
        buf.put_u16_le(len);
        buf.put_slice(self.as_bytes());
        Ok(())
    }
}

impl WireEncode for String {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.as_str().encode(buf)
    }
}

impl WireDecode for String {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        let len = usize::from(reader.read::<u16>()?);
        let bytes = reader.take(len)?;
        std::str::from_utf8(&bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

impl WireEncode for Vec2 {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.x.encode(buf)?;
        self.y.encode(buf)
    }
}

impl WireDecode for Vec2 {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(Self::new(f32::decode(reader)?, f32::decode(reader)?))
    }
}

impl WireEncode for Vec3 {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.x.encode(buf)?;
        self.y.encode(buf)?;
        self.z.encode(buf)
    }
}

impl WireDecode for Vec3 {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(Self::new(
            f32::decode(reader)?,
            f32::decode(reader)?,
            f32::decode(reader)?,
        ))
    }
}

impl WireEncode for Quat {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.x.encode(buf)?;
        self.y.encode(buf)?;
        self.z.encode(buf)?;
        self.w.encode(buf)
    }
}

impl WireDecode for Quat {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(Self::new(
            f32::decode(reader)?,
            f32::decode(reader)?,
            f32::decode(reader)?,
            f32::decode(reader)?,
        ))
    }
}

impl WireEncode for Pose {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.position.encode(buf)?;
        self.orientation.encode(buf)
    }
}

impl WireDecode for Pose {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        Ok(Self::new(Vec3::decode(reader)?, Quat::decode(reader)?))
    }
}

// Identifiers travel as their raw integer.

impl WireEncode for SessionId {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.0.encode(buf)
    }
}

impl WireDecode for SessionId {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        u16::decode(reader).map(SessionId)
    }
}

impl WireEncode for ObjectId {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.0.encode(buf)
    }
}

impl WireDecode for ObjectId {
    fn decode(reader: &mut MessageReader) -> Result<Self, ProtocolError> {
        i32::decode(reader).map(ObjectId)
    }
}

// =========================================================================
// Tests
// =========================================================================
