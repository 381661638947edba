//! Print every frame arriving on a serial port.
//!
//! Run with:
//!   cargo run --example port-monitor -- /dev/ttyUSB0 115200

use std::time::Duration;

use simpleserial::link::{open_serial, LinkConfig, LinkError};
use simpleserial::transport::{BaudRate, SerialConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port = args.next().ok_or("usage: port-monitor <PORT> [BAUD]")?;
    let baud: BaudRate = match args.next() {
        Some(baud) => baud.parse()?,
        None => BaudRate::B115200,
    };

    let link = open_serial(
        SerialConfig::new(port).with_baud_rate(baud),
        LinkConfig::default(),
    )?;
    eprintln!("listening on {}", link.transport_name());

    loop {
        match link.take_message_timeout(Duration::from_secs(5)) {
            Ok(message) => println!("title={:3} payload={:02x?}", message.title(), message.payload().as_ref()),
            Err(LinkError::Timeout(_)) => eprintln!("(idle)"),
            Err(err) => return Err(err.into()),
        }
    }
}
