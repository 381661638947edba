use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// First byte of every frame.
pub const PREAMBLE: u8 = 0xAA;

/// Last byte of every frame.
pub const TERMINATOR: u8 = 0x1E;

/// Frame header: preamble (1) + version (1) + title (1) + length (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Frame trailer: terminator (1).
pub const TRAILER_SIZE: usize = 1;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Smallest possible frame (empty payload).
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + TRAILER_SIZE;

/// Largest possible frame.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD + TRAILER_SIZE;

/// Protocol revisions understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    #[default]
    V1,
}

impl ProtocolVersion {
    /// The version tag as it appears on the wire.
    pub const fn wire_byte(self) -> u8 {
        match self {
            ProtocolVersion::V1 => 0x01,
        }
    }

    /// Look up a version by its wire tag.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ProtocolVersion::V1),
            _ => None,
        }
    }
}

/// A decoded or to-be-sent message.
///
/// The wire length is never stored: it is always the payload length, which
/// is guaranteed to fit in one byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    title: u8,
    payload: Bytes,
}

impl Message {
    /// Create a message, rejecting payloads longer than [`MAX_PAYLOAD`].
    pub fn new(title: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        check_payload_len(payload.len())?;
        Ok(Self { title, payload })
    }

    /// Create a message with no payload.
    pub fn empty(title: u8) -> Self {
        Self {
            title,
            payload: Bytes::new(),
        }
    }

    /// Only for payloads already known to fit.
    pub(crate) fn from_parts(title: u8, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        Self { title, payload }
    }

    /// Message type identifier.
    pub fn title(&self) -> u8 {
        self.title
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length as carried in the length field.
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Consume the message, returning its title and payload.
    pub fn into_parts(self) -> (u8, Bytes) {
        (self.title, self.payload)
    }

    /// The total wire size of this message once framed.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }

    /// Encode this message into a standalone frame.
    pub fn to_frame(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        put_frame(self.title, &self.payload, &mut dst);
        dst.freeze()
    }
}

/// Encode a frame into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────┬───────┬────────┬──────────────────┬────────────┐
/// │ Preamble │ Version │ Title │ Length │ Payload          │ Terminator │
/// │ 0xAA     │ 0x01    │ (1B)  │ (1B)   │ (Length bytes)   │ 0x1E       │
/// └──────────┴─────────┴───────┴────────┴──────────────────┴────────────┘
/// ```
///
/// The length byte is always computed from `payload`; nothing is escaped.
pub fn encode_frame(title: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    check_payload_len(payload.len())?;
    put_frame(title, payload, dst);
    Ok(())
}

/// Encode a frame into a freshly allocated buffer.
pub fn encode(title: u8, payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    encode_frame(title, payload, &mut dst)?;
    Ok(dst.freeze())
}

fn put_frame(title: u8, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    dst.put_u8(PREAMBLE);
    dst.put_u8(ProtocolVersion::V1.wire_byte());
    dst.put_u8(title);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    dst.put_u8(TERMINATOR);
}

fn check_payload_len(size: usize) -> Result<()> {
    if size > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD,
        });
    }
    Ok(())
}

/// Configuration for the frame decoder.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Abandon a partial frame once this much time has passed since its
    /// preamble. `None` waits forever.
    pub frame_timeout: Option<Duration>,
}
