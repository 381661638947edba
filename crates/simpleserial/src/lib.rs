//! Framed messaging over serial links.
//!
//! Every message travels as a small frame (`0xAA`, version, title, length,
//! payload, `0x1E`). The decoder resynchronizes on its own after noise or
//! truncated frames, so a link can be plugged in mid-stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transports (serial ports, in-memory pairs) and line settings
//! - [`frame`]: wire format, encoder and resynchronizing decoder
//! - [`link`]: dispatch loop with a background queue or cooperative polling

/// Re-export transport types.
pub mod transport {
    pub use simpleserial_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use simpleserial_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use simpleserial_link::*;
}

pub use simpleserial_frame::Message;
pub use simpleserial_link::{LinkConfig, LinkError, LinkFailure, Poller, SerialLink};
pub use simpleserial_transport::{SerialConfig, SerialTransport};
