use std::time::Duration;

use crate::error::Result;

/// How long a single-byte read may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Return immediately with `None` if nothing is buffered.
    NonBlocking,
    /// Wait for a byte. `None` waits indefinitely; `Some(d)` gives up after
    /// `d` and returns `Ok(None)`.
    Blocking(Option<Duration>),
}

/// A byte-stream endpoint the framing layer can drive.
///
/// The framing code only ever needs "give me the next byte, if any" and
/// "put these bytes on the wire". Everything else about the physical link
/// (line settings, device naming) stays behind this trait.
pub trait ByteTransport: Send {
    /// Open the underlying device. Opening an already open transport is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Whether `open()` has succeeded and `close()` has not been called since.
    fn is_open(&self) -> bool;

    /// Read the next byte.
    ///
    /// `Ok(None)` means no byte arrived within the allowed wait; it is not an
    /// error.
    fn read_byte(&mut self, mode: ReadMode) -> Result<Option<u8>>;

    /// Number of bytes that can be read right now without blocking.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Write the whole buffer, failing if it cannot be written within `timeout`.
    fn write(&mut self, bytes: &[u8], timeout: Option<Duration>) -> Result<()>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);

    /// Open a second handle onto the same device.
    ///
    /// Used to give the receive loop and the sender independent handles.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized;

    /// Human-readable endpoint name for diagnostics.
    fn name(&self) -> &str;
}
