use simpleserial_transport::TransportError;

/// Errors that can occur during frame encoding or sending.
///
/// Malformed input on the receive side is never an error: the decoder drops
/// it and goes back to scanning for a preamble.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the one-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transport failed while a frame was being written.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),

    /// An I/O error surfaced through a byte stream adapter.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
