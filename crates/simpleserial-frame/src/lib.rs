//! Simple serial framing: a frame encoder and a resynchronizing decoder.
//!
//! Every message travels as:
//! - a 1-byte preamble (`0xAA`) for stream synchronization
//! - a 1-byte protocol version (`0x01`)
//! - a 1-byte title identifying the message type
//! - a 1-byte payload length, then the payload itself
//! - a 1-byte terminator (`0x1E`)
//!
//! The decoder consumes one byte at a time, so it can sit directly behind a
//! serial port read loop. Corrupt or truncated frames are dropped silently;
//! the decoder just goes back to looking for a preamble.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::SimpleSerialCodec;
pub use codec::{
    encode, encode_frame, FrameConfig, Message, ProtocolVersion, HEADER_SIZE, MAX_FRAME_SIZE,
    MAX_PAYLOAD, MIN_FRAME_SIZE, PREAMBLE, TERMINATOR, TRAILER_SIZE,
};
pub use decoder::{DecoderState, DecoderStats, FrameDecoder, ResetHandle};
pub use error::{FrameError, Result};
pub use writer::FrameWriter;
