use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simpleserial_link::{LinkError, SerialLink};
use simpleserial_transport::{ByteTransport, SerialTransport};

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{link_error, CliResult, SUCCESS};

const TICK: Duration = Duration::from_millis(100);

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let transport = SerialTransport::new(args.port.serial_config()?);
    let mut link = SerialLink::new(transport, args.port.link_config()?)
        .with_error_handler(|failure| tracing::error!(reason = failure.as_str(), "echo link failed"));
    link.connect()
        .map_err(|err| link_error("connect failed", err))?;

    let echoed = echo_until_stopped(&mut link, &running)
        .map_err(|err| link_error("echo failed", err))?;
    tracing::info!(echoed, "echo stopped");

    link.close();
    Ok(SUCCESS)
}

fn echo_until_stopped<T: ByteTransport + 'static>(
    link: &mut SerialLink<T>,
    running: &AtomicBool,
) -> Result<usize, LinkError> {
    link.start()?;
    let mut echoed = 0usize;

    while running.load(Ordering::SeqCst) {
        let message = match link.take_message_timeout(TICK) {
            Ok(message) => message,
            Err(LinkError::Timeout(_)) => continue,
            Err(err) => return Err(err),
        };

        tracing::info!(
            title = message.title(),
            length = message.length(),
            "echoing message"
        );
        link.send_message(&message)?;
        echoed = echoed.saturating_add(1);
    }

    link.stop()?;
    Ok(echoed)
}

#[cfg(test)]
mod tests {
    use simpleserial_frame::{encode, FrameDecoder};
    use simpleserial_link::LinkConfig;
    use simpleserial_transport::{MemoryTransport, ReadMode};

    use super::*;

    #[test]
    fn echoes_until_flag_clears() {
        let (local, mut remote) = MemoryTransport::pair();
        remote.open().unwrap();
        let mut link = SerialLink::new(
            local,
            LinkConfig {
                poll_interval: Duration::from_millis(5),
                ..LinkConfig::default()
            },
        );
        link.connect().unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let worker = std::thread::spawn(move || {
            let echoed = echo_until_stopped(&mut link, &flag);
            (echoed, link)
        });

        remote.write(&encode(3, b"echo me").unwrap(), None).unwrap();

        let mut decoder = FrameDecoder::new();
        let reply = loop {
            let byte = remote
                .read_byte(ReadMode::Blocking(Some(Duration::from_secs(2))))
                .unwrap()
                .expect("echo should arrive");
            if let Some(message) = decoder.feed(byte) {
                break message;
            }
        };
        running.store(false, Ordering::SeqCst);

        let (echoed, link) = worker.join().unwrap();
        assert_eq!(echoed.unwrap(), 1);
        assert!(!link.is_running());
        assert_eq!(reply.title(), 3);
        assert_eq!(reply.payload().as_ref(), b"echo me");
    }
}
