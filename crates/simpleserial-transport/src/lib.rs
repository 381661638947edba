//! Byte transport abstraction for simple serial framing.
//!
//! The framing layer needs exactly two things from the wire: "read the next
//! byte if one is available" and "write this buffer". [`ByteTransport`]
//! captures that contract. Two implementations ship here:
//! - [`SerialTransport`]: a real serial port via the `serialport` driver
//! - [`MemoryTransport`]: an in-process connected pair for tests and demos
//!
//! This is the lowest layer of simpleserial. Everything else builds on top of
//! the trait provided here.

pub mod config;
pub mod error;
pub mod memory;
pub mod serial;
pub mod traits;

pub use config::{BaudRate, Parity, SerialConfig, StopBits};
pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use serial::{list_available_ports, SerialTransport};
pub use traits::{ByteTransport, ReadMode};
