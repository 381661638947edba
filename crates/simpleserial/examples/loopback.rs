//! Two links talking over an in-memory pair, no hardware needed.
//!
//! Run with:
//!   cargo run --example loopback
//!
//! One side runs the receive thread with a message callback; the other side
//! polls from the main thread and answers each request.

use std::time::Duration;

use simpleserial::frame::Message;
use simpleserial::link::{LinkConfig, Poller, SerialLink};
use simpleserial::transport::MemoryTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_end, device_end) = MemoryTransport::pair();

    let mut host = SerialLink::new(host_end, LinkConfig::default())
        .with_message_handler(|message| {
            eprintln!("host callback: title={} len={}", message.title(), message.length());
        })
        .with_error_handler(|failure| eprintln!("host failure: {failure}"));
    host.connect()?;
    host.start()?;

    let mut device = Poller::new(device_end);
    device.connect()?;

    for (title, text) in [(0x01u8, "status?"), (0x02, "temperature?")] {
        host.send(title, text.as_bytes())?;

        let request = loop {
            if let Some(message) = device.poll()? {
                break message;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        let answer = Message::new(request.title() | 0x80, format!("ack {text}").into_bytes())?;
        device.send(answer.title(), answer.payload())?;

        let reply = host.take_message_timeout(Duration::from_secs(1))?;
        println!(
            "reply title=0x{:02X} payload={}",
            reply.title(),
            String::from_utf8_lossy(reply.payload())
        );
    }

    let stats = host.stop()?;
    eprintln!(
        "host decoded {} frames, skipped {} bytes",
        stats.frames_decoded, stats.bytes_skipped
    );
    Ok(())
}
