use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{FrameConfig, Message, ProtocolVersion, MAX_PAYLOAD, PREAMBLE, TERMINATOR};

/// Where the decoder is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Discarding bytes until a preamble shows up.
    SeekingPreamble,
    ExpectVersion,
    ExpectTitle,
    ExpectLength,
    /// Collecting payload; `remaining` bytes still to come.
    AccumulatingPayload { remaining: u8 },
    ExpectTerminator,
}

/// Counters describing what the decoder has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete, well-formed frames emitted.
    pub frames_decoded: u64,
    /// Frames abandoned after their preamble (bad version, bad terminator,
    /// timeout or reset).
    pub frames_discarded: u64,
    /// Bytes skipped while searching for a preamble.
    pub bytes_skipped: u64,
}

/// Cross-thread handle that asks a [`FrameDecoder`] to drop its partial frame.
///
/// The request is applied before the next byte is interpreted, whatever state
/// the decoder is in.
#[derive(Debug, Clone)]
pub struct ResetHandle {
    requested: Arc<AtomicBool>,
}

impl ResetHandle {
    /// Request a return to preamble search.
    pub fn reset(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether a request is still waiting to be applied.
    pub fn is_pending(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Incremental simple serial frame decoder.
///
/// Feed it one byte at a time; it hands back a [`Message`] on the byte that
/// completes a valid frame. Anything malformed is dropped silently and the
/// decoder resumes searching for a preamble. Payload bytes are never
/// inspected for control values: the length field alone bounds the payload.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    title: u8,
    payload: BytesMut,
    frame_started: Option<Instant>,
    config: FrameConfig,
    reset_requested: Arc<AtomicBool>,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with no frame timeout.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            state: DecoderState::SeekingPreamble,
            title: 0,
            payload: BytesMut::with_capacity(MAX_PAYLOAD),
            frame_started: None,
            config,
            reset_requested: Arc::new(AtomicBool::new(false)),
            stats: DecoderStats::default(),
        }
    }

    /// Current position within a frame.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Counters accumulated since construction.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Handle that can reset this decoder from another thread.
    pub fn reset_handle(&self) -> ResetHandle {
        ResetHandle {
            requested: Arc::clone(&self.reset_requested),
        }
    }

    /// Drop any partial frame and return to preamble search now.
    pub fn reset(&mut self) {
        self.reset_requested.store(false, Ordering::Release);
        self.abandon("reset");
    }

    /// Consume one byte. Returns a message if this byte completes a frame.
    pub fn feed(&mut self, byte: u8) -> Option<Message> {
        let now = self.config.frame_timeout.map(|_| Instant::now());
        self.step(byte, now)
    }

    /// Like [`feed`](Self::feed), with the arrival time supplied by the caller.
    pub fn feed_at(&mut self, byte: u8, now: Instant) -> Option<Message> {
        self.step(byte, Some(now))
    }

    /// Feed a run of bytes, collecting every message they complete.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<Message> {
        bytes.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    fn step(&mut self, byte: u8, now: Option<Instant>) -> Option<Message> {
        if self.reset_requested.swap(false, Ordering::AcqRel) {
            self.abandon("reset requested");
        }

        if let (Some(limit), Some(started), Some(now)) =
            (self.config.frame_timeout, self.frame_started, now)
        {
            if now.saturating_duration_since(started) > limit {
                self.abandon("frame timeout");
            }
        }

        match self.state {
            DecoderState::SeekingPreamble => {
                if byte == PREAMBLE {
                    self.frame_started = now;
                    self.state = DecoderState::ExpectVersion;
                } else {
                    self.stats.bytes_skipped += 1;
                }
                None
            }
            DecoderState::ExpectVersion => {
                if ProtocolVersion::from_wire(byte).is_some() {
                    self.state = DecoderState::ExpectTitle;
                } else {
                    trace!(version = byte, "unknown protocol version");
                    self.abandon("bad version");
                }
                None
            }
            DecoderState::ExpectTitle => {
                self.title = byte;
                self.state = DecoderState::ExpectLength;
                None
            }
            DecoderState::ExpectLength => {
                self.payload.clear();
                self.state = match byte {
                    0 => DecoderState::ExpectTerminator,
                    remaining => DecoderState::AccumulatingPayload { remaining },
                };
                None
            }
            DecoderState::AccumulatingPayload { remaining } => {
                self.payload.extend_from_slice(&[byte]);
                self.state = match remaining - 1 {
                    0 => DecoderState::ExpectTerminator,
                    remaining => DecoderState::AccumulatingPayload { remaining },
                };
                None
            }
            DecoderState::ExpectTerminator => {
                if byte != TERMINATOR {
                    trace!(terminator = byte, "bad frame terminator");
                    self.abandon("bad terminator");
                    return None;
                }

                let message = Message::from_parts(self.title, self.payload.split().freeze());
                self.state = DecoderState::SeekingPreamble;
                self.frame_started = None;
                self.stats.frames_decoded += 1;
                debug!(
                    title = message.title(),
                    length = message.length(),
                    "frame decoded"
                );
                Some(message)
            }
        }
    }

    fn abandon(&mut self, reason: &'static str) {
        if self.state != DecoderState::SeekingPreamble {
            self.stats.frames_discarded += 1;
            trace!(reason, state = ?self.state, "discarding partial frame");
        }
        self.state = DecoderState::SeekingPreamble;
        self.frame_started = None;
        self.payload.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::encode;

    #[test]
    fn decodes_single_frame() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.feed_all(&[0xAA, 0x01, 0x05, 0x02, 0x11, 0x22, 0x1E]);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].title(), 5);
        assert_eq!(messages[0].payload().as_ref(), &[0x11, 0x22]);
        assert_eq!(decoder.state(), DecoderState::SeekingPreamble);
    }

    #[test]
    fn emits_only_on_terminator_byte() {
        let mut decoder = FrameDecoder::new();
        let frame = encode(1, b"abc").unwrap();
        let (last, head) = frame.split_last().unwrap();

        for &byte in head {
            assert!(decoder.feed(byte).is_none());
        }
        let message = decoder.feed(*last).expect("terminator completes the frame");
        assert_eq!(message.payload().as_ref(), b"abc");
    }

    #[test]
    fn zero_length_payload() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(0xAA).is_none());
        assert!(decoder.feed(0x01).is_none());
        assert!(decoder.feed(0x09).is_none());
        assert!(decoder.feed(0x00).is_none());
        assert_eq!(decoder.state(), DecoderState::ExpectTerminator);

        let message = decoder.feed(0x1E).unwrap();
        assert_eq!(message.title(), 9);
        assert!(message.payload().is_empty());
    }

    #[test]
    fn wrong_terminator_resyncs() {
        let mut decoder = FrameDecoder::new();
        let mut stream = vec![0xAA, 0x01, 0x05, 0x02, 0x11, 0x22, 0xFF];
        stream.extend_from_slice(&[0xAA, 0x01, 0x07, 0x00, 0x1E]);

        let messages = decoder.feed_all(&stream);
        assert_eq!(messages, vec![Message::empty(7)]);
        assert_eq!(decoder.stats().frames_discarded, 1);
        assert_eq!(decoder.stats().frames_decoded, 1);
    }

    #[test]
    fn bad_version_byte_is_consumed() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(0xAA);
        // A second preamble in the version slot is rejected, not restarted on.
        decoder.feed(0xAA);
        assert_eq!(decoder.state(), DecoderState::SeekingPreamble);

        let messages = decoder.feed_all(&[0x01, 0x03, 0x00, 0x1E]);
        assert!(messages.is_empty());

        let messages = decoder.feed_all(&[0xAA, 0x01, 0x03, 0x00, 0x1E]);
        assert_eq!(messages, vec![Message::empty(3)]);
    }

    #[test]
    fn payload_may_contain_control_bytes() {
        let payload = [0xAA, 0x1E, 0x01, 0xAA, 0x1E];
        let frame = encode(0x42, &payload).unwrap();

        let mut decoder = FrameDecoder::new();
        let messages = decoder.feed_all(&frame);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload().as_ref(), &payload);
    }

    #[test]
    fn noise_before_preamble_is_skipped() {
        let mut stream = vec![0x00, 0x1E, 0x13, 0x37, 0xFF];
        stream.extend_from_slice(&encode(2, b"ok").unwrap());

        let mut decoder = FrameDecoder::new();
        let messages = decoder.feed_all(&stream);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload().as_ref(), b"ok");
        assert_eq!(decoder.stats().bytes_skipped, 5);
    }

    #[test]
    fn back_to_back_frames() {
        let mut stream = encode(1, b"one").unwrap().to_vec();
        stream.extend_from_slice(&encode(2, b"").unwrap());
        stream.extend_from_slice(&encode(3, b"three").unwrap());

        let mut decoder = FrameDecoder::new();
        let titles: Vec<u8> = decoder
            .feed_all(&stream)
            .iter()
            .map(Message::title)
            .collect();
        assert_eq!(titles, vec![1, 2, 3]);
    }

    #[test]
    fn state_walk() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.state(), DecoderState::SeekingPreamble);
        decoder.feed(0xAA);
        assert_eq!(decoder.state(), DecoderState::ExpectVersion);
        decoder.feed(0x01);
        assert_eq!(decoder.state(), DecoderState::ExpectTitle);
        decoder.feed(0x10);
        assert_eq!(decoder.state(), DecoderState::ExpectLength);
        decoder.feed(0x02);
        assert_eq!(
            decoder.state(),
            DecoderState::AccumulatingPayload { remaining: 2 }
        );
        decoder.feed(0x00);
        assert_eq!(
            decoder.state(),
            DecoderState::AccumulatingPayload { remaining: 1 }
        );
        decoder.feed(0x00);
        assert_eq!(decoder.state(), DecoderState::ExpectTerminator);
    }

    #[test]
    fn reset_drops_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed_all(&[0xAA, 0x01, 0x04, 0x03, 0x10]);
        decoder.reset();
        assert_eq!(decoder.state(), DecoderState::SeekingPreamble);

        // Tail of the abandoned frame is noise now.
        assert!(decoder.feed_all(&[0x11, 0x12, 0x1E]).is_empty());
        assert_eq!(decoder.stats().frames_discarded, 1);
    }

    #[test]
    fn reset_handle_applies_before_next_byte() {
        let mut decoder = FrameDecoder::new();
        let handle = decoder.reset_handle();
        decoder.feed_all(&[0xAA, 0x01, 0x04, 0x03, 0x10]);

        std::thread::spawn(move || handle.reset())
            .join()
            .expect("reset thread should complete");

        // 0xAA is interpreted from preamble search, so it starts a new frame.
        decoder.feed(0xAA);
        assert_eq!(decoder.state(), DecoderState::ExpectVersion);
    }

    #[test]
    fn reset_handle_pending_flag() {
        let mut decoder = FrameDecoder::new();
        let handle = decoder.reset_handle();
        handle.reset();
        assert!(handle.is_pending());
        decoder.feed(0x00);
        assert!(!handle.is_pending());
    }

    #[test]
    fn reset_while_idle_does_not_count_discard() {
        let mut decoder = FrameDecoder::new();
        decoder.reset();
        decoder.reset_handle().reset();
        decoder.feed(0x00);
        assert_eq!(decoder.stats().frames_discarded, 0);
    }

    #[test]
    fn frame_timeout_abandons_stale_frame() {
        let config = FrameConfig {
            frame_timeout: Some(Duration::from_millis(100)),
        };
        let mut decoder = FrameDecoder::with_config(config);
        let t0 = Instant::now();

        decoder.feed_at(0xAA, t0);
        decoder.feed_at(0x01, t0);
        decoder.feed_at(0x08, t0);
        decoder.feed_at(0x01, t0);
        assert_eq!(
            decoder.state(),
            DecoderState::AccumulatingPayload { remaining: 1 }
        );

        // Too late: the byte lands in preamble search instead of the payload.
        let late = t0 + Duration::from_millis(150);
        assert!(decoder.feed_at(0x55, late).is_none());
        assert_eq!(decoder.state(), DecoderState::SeekingPreamble);
        assert_eq!(decoder.stats().frames_discarded, 1);
    }

    #[test]
    fn frame_timeout_allows_timely_frame() {
        let config = FrameConfig {
            frame_timeout: Some(Duration::from_millis(100)),
        };
        let mut decoder = FrameDecoder::with_config(config);
        let t0 = Instant::now();
        let frame = encode(6, b"hi").unwrap();

        let mut out = None;
        for (i, &byte) in frame.iter().enumerate() {
            out = decoder.feed_at(byte, t0 + Duration::from_millis(10 * i as u64));
        }
        assert_eq!(out, Some(Message::new(6, &b"hi"[..]).unwrap()));
    }

    #[test]
    fn frame_timeout_restarts_on_late_preamble() {
        let config = FrameConfig {
            frame_timeout: Some(Duration::from_millis(50)),
        };
        let mut decoder = FrameDecoder::with_config(config);
        let t0 = Instant::now();
        decoder.feed_at(0xAA, t0);
        decoder.feed_at(0x01, t0);

        let t1 = t0 + Duration::from_millis(80);
        let mut out = None;
        for &byte in encode(1, b"x").unwrap().iter() {
            out = decoder.feed_at(byte, t1);
        }
        assert_eq!(out.map(|m| m.title()), Some(1));
    }
}
