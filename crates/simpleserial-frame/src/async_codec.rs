use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, FrameConfig, Message};
use crate::decoder::{DecoderStats, FrameDecoder, ResetHandle};
use crate::error::FrameError;

/// `tokio_util` codec for simple serial frames.
///
/// Decoding runs the same resynchronizing state machine as [`FrameDecoder`],
/// so partial frames survive across reads and noise is skipped.
#[derive(Debug, Default)]
pub struct SimpleSerialCodec {
    decoder: FrameDecoder,
}

impl SimpleSerialCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::with_config(config),
        }
    }

    pub fn reset_handle(&self) -> ResetHandle {
        self.decoder.reset_handle()
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl Decoder for SimpleSerialCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            if let Some(message) = self.decoder.feed(src.get_u8()) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

impl Encoder<Message> for SimpleSerialCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item.title(), item.payload(), dst)
    }
}

impl<'a> Encoder<(u8, &'a [u8])> for SimpleSerialCodec {
    type Error = FrameError;

    fn encode(&mut self, item: (u8, &'a [u8]), dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item.0, item.1, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[test]
    fn decode_keeps_partial_frame_between_calls() {
        let mut codec = SimpleSerialCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0xAA, 0x01, 0x02][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(&[0x01, 0x7F, 0x1E]);
        let message = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(message.title(), 2);
        assert_eq!(message.payload().as_ref(), &[0x7F]);
    }

    #[test]
    fn decode_leaves_following_frame_in_buffer() {
        let mut codec = SimpleSerialCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::empty(1), &mut buf).unwrap();
        codec.encode((2u8, &b"two"[..]), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.title(), 1);
        assert!(!buf.is_empty());

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.payload().as_ref(), b"two");
        assert_eq!(codec.stats().frames_decoded, 2);
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, SimpleSerialCodec::new());
        let mut stream = FramedRead::new(server, SimpleSerialCodec::new());

        sink.send(Message::new(10, &b"ping"[..]).unwrap())
            .await
            .unwrap();
        sink.send(Message::empty(11)).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!((first.title(), first.payload().as_ref()), (10, b"ping".as_ref()));
        assert_eq!(second.title(), 11);
    }
}
