use std::time::Duration;

use bytes::BytesMut;
use simpleserial_transport::ByteTransport;
use tracing::debug;

use crate::codec::{encode_frame, Message, MAX_FRAME_SIZE};
use crate::error::Result;

/// Writes complete frames to a [`ByteTransport`].
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    write_timeout: Option<Duration>,
}

impl<T: ByteTransport> FrameWriter<T> {
    /// Create a frame writer with no write timeout.
    pub fn new(inner: T) -> Self {
        Self::with_timeout(inner, None)
    }

    /// Create a frame writer whose writes fail after `write_timeout`.
    pub fn with_timeout(inner: T, write_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
            write_timeout,
        }
    }

    /// Write a complete message (blocking).
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.send(message.title(), message.payload())
    }

    /// Encode and send a payload under `title`.
    ///
    /// Nothing reaches the wire if the payload is too large.
    pub fn send(&mut self, title: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(title, payload, &mut self.buf)?;
        self.inner.write(&self.buf, self.write_timeout)?;
        debug!(title, length = payload.len(), port = %self.inner.name(), "frame sent");
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update the write timeout for subsequent frames.
    pub fn set_write_timeout(&mut self, write_timeout: Option<Duration>) {
        self.write_timeout = write_timeout;
    }

    /// Current write timeout.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }
}

#[cfg(test)]
mod tests {
    use simpleserial_transport::{MemoryTransport, ReadMode, TransportError};

    use super::*;
    use crate::decoder::FrameDecoder;
    use crate::error::FrameError;

    fn open_pair() -> (MemoryTransport, MemoryTransport) {
        let (mut a, mut b) = MemoryTransport::pair();
        a.open().unwrap();
        b.open().unwrap();
        (a, b)
    }

    fn drain(transport: &mut MemoryTransport) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(byte) = transport.read_byte(ReadMode::NonBlocking).unwrap() {
            out.push(byte);
        }
        out
    }

    #[test]
    fn write_single_frame() {
        let (a, mut b) = open_pair();
        let mut writer = FrameWriter::new(a);

        writer.send(1, b"hello").unwrap();

        let wire = drain(&mut b);
        let messages = FrameDecoder::new().feed_all(&wire);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].title(), 1);
        assert_eq!(messages[0].payload().as_ref(), b"hello");
    }

    #[test]
    fn write_multiple_messages() {
        let (a, mut b) = open_pair();
        let mut writer = FrameWriter::new(a);

        let first = Message::new(1, &b"first"[..]).unwrap();
        let second = Message::empty(2);
        writer.write_message(&first).unwrap();
        writer.write_message(&second).unwrap();

        let messages = FrameDecoder::new().feed_all(&drain(&mut b));
        assert_eq!(messages, vec![first, second]);
    }

    #[test]
    fn oversized_payload_writes_nothing() {
        let (a, mut b) = open_pair();
        let mut writer = FrameWriter::new(a);

        let err = writer.send(1, &[0u8; 256]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 256, .. }));
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn transport_failure_propagates() {
        let (a, _b) = open_pair();
        a.inject_write_failure();
        let mut writer = FrameWriter::new(a);

        let err = writer.send(1, b"x").unwrap_err();
        assert!(matches!(err, FrameError::Transport(TransportError::Io(_))));
    }

    #[test]
    fn timeout_accessors_and_into_inner() {
        let (a, _b) = open_pair();
        let mut writer = FrameWriter::with_timeout(a, Some(Duration::from_millis(5)));
        assert_eq!(writer.write_timeout(), Some(Duration::from_millis(5)));

        writer.set_write_timeout(None);
        assert_eq!(writer.write_timeout(), None);

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let inner = writer.into_inner();
        assert!(inner.is_open());
    }
}
