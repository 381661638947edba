use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{Parity, SerialConfig, StopBits};
use crate::error::{Result, TransportError};
use crate::traits::{ByteTransport, ReadMode};

/// Wait used where the caller asked for no timeout. Kept well inside the
/// millisecond range every platform driver accepts.
const INDEFINITE_WAIT: Duration = Duration::from_secs(60 * 60);

/// Serial port transport backed by the `serialport` driver.
///
/// The port is configured 8 data bits, no flow control; baud rate, parity
/// and stop bits come from [`SerialConfig`].
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    /// Create an unopened transport for the given line settings.
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    /// Line settings this transport was created with.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl ByteTransport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(self.config.port.as_str(), self.config.baud_rate.as_u32())
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(driver_parity(self.config.parity))
            .stop_bits(driver_stop_bits(self.config.stop_bits))
            .timeout(self.config.timeout.unwrap_or(INDEFINITE_WAIT))
            .open()
            .map_err(|err| TransportError::Open {
                port: self.config.port.clone(),
                source: err.into(),
            })?;

        info!(
            port = %self.config.port,
            baud = %self.config.baud_rate,
            parity = %self.config.parity.wire_code(),
            stop_bits = %self.config.stop_bits,
            "serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_byte(&mut self, mode: ReadMode) -> Result<Option<u8>> {
        let port = self.port_mut()?;
        match mode {
            ReadMode::NonBlocking => {
                let pending = port
                    .bytes_to_read()
                    .map_err(|err| TransportError::Io(err.into()))?;
                if pending == 0 {
                    return Ok(None);
                }
                read_one(port.as_mut())
            }
            ReadMode::Blocking(Some(timeout)) => read_within(port.as_mut(), timeout),
            ReadMode::Blocking(None) => loop {
                if let Some(byte) = read_within(port.as_mut(), INDEFINITE_WAIT)? {
                    return Ok(Some(byte));
                }
            },
        }
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let port = self.port_mut()?;
        let pending = port
            .bytes_to_read()
            .map_err(|err| TransportError::Io(err.into()))?;
        Ok(pending as usize)
    }

    fn write(&mut self, bytes: &[u8], timeout: Option<Duration>) -> Result<()> {
        let port = self.port_mut()?;
        write_all(port.as_mut(), bytes, timeout)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.config.port, "serial port closed");
        }
    }

    fn try_clone(&self) -> Result<Self> {
        let port = match &self.port {
            Some(port) => Some(
                port.try_clone()
                    .map_err(|err| TransportError::Io(err.into()))?,
            ),
            None => None,
        };
        Ok(Self {
            config: self.config.clone(),
            port,
        })
    }

    fn name(&self) -> &str {
        &self.config.port
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("config", &self.config)
            .field("open", &self.port.is_some())
            .finish()
    }
}

/// List the serial ports currently present on this machine.
pub fn list_available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|err| TransportError::Enumerate(err.into()))?;
    debug!(count = ports.len(), "enumerated serial ports");
    Ok(ports.into_iter().map(|info| info.port_name).collect())
}

/// The read/write half of a port plus its timeout setter.
///
/// Handles cloned with `try_clone` may share one device-wide timeout (the
/// Windows driver does), so nothing here trusts a cached value: reads set
/// their bound on every call and unbounded writes never touch it.
trait TimedPort: Read + Write {
    fn apply_timeout(&mut self, timeout: Duration) -> Result<()>;
}

impl TimedPort for dyn serialport::SerialPort {
    fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.set_timeout(timeout)
            .map_err(|err| TransportError::Io(err.into()))
    }
}

fn read_within<P: TimedPort + ?Sized>(port: &mut P, timeout: Duration) -> Result<Option<u8>> {
    port.apply_timeout(timeout)?;
    read_one(port)
}

/// Write every byte and flush. With no timeout the port's current bound is
/// left alone and timed-out attempts are retried.
fn write_all<P: TimedPort + ?Sized>(
    port: &mut P,
    bytes: &[u8],
    timeout: Option<Duration>,
) -> Result<()> {
    if let Some(timeout) = timeout {
        port.apply_timeout(timeout)?;
    }
    let retry = |err: &std::io::Error| match err.kind() {
        ErrorKind::Interrupted => true,
        ErrorKind::TimedOut | ErrorKind::WouldBlock => timeout.is_none(),
        _ => false,
    };

    let mut offset = 0usize;
    while offset < bytes.len() {
        match port.write(&bytes[offset..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => offset += n,
            Err(err) if retry(&err) => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match port.flush() {
            Ok(()) => return Ok(()),
            Err(err) if retry(&err) => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

fn read_one<P: Read + ?Sized>(port: &mut P) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match port.read(&mut byte) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(_) => return Ok(Some(byte[0])),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Ok(None)
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

fn driver_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn driver_stop_bits(stop_bits: StopBits) -> serialport::StopBits {
    match stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;

    /// Port double that records every timeout it is given.
    #[derive(Default)]
    struct RecordingPort {
        timeouts: Vec<Duration>,
        incoming: VecDeque<u8>,
        stalls: usize,
        written: Vec<u8>,
    }

    impl Read for RecordingPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.incoming.pop_front() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                None => Err(io::Error::new(ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for RecordingPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalls > 0 {
                self.stalls -= 1;
                return Err(io::Error::new(ErrorKind::TimedOut, "tx full"));
            }
            // One byte per call to exercise the partial-write loop.
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl TimedPort for RecordingPort {
        fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    #[test]
    fn timed_read_sets_its_bound_on_every_call() {
        let mut port = RecordingPort {
            incoming: VecDeque::from([0x42]),
            ..RecordingPort::default()
        };
        let bound = Duration::from_millis(50);

        assert_eq!(read_within(&mut port, bound).unwrap(), Some(0x42));
        assert_eq!(read_within(&mut port, bound).unwrap(), None);
        assert_eq!(port.timeouts, vec![bound, bound]);
    }

    #[test]
    fn unbounded_write_leaves_timeout_alone_and_retries() {
        let mut port = RecordingPort {
            stalls: 2,
            ..RecordingPort::default()
        };

        write_all(&mut port, b"abc", None).unwrap();
        assert_eq!(port.written, b"abc");
        assert!(port.timeouts.is_empty());
    }

    #[test]
    fn bounded_write_gives_up_on_timeout() {
        let mut port = RecordingPort {
            stalls: 1,
            ..RecordingPort::default()
        };
        let bound = Duration::from_millis(10);

        match write_all(&mut port, b"abc", Some(bound)) {
            Err(TransportError::Io(err)) => assert_eq!(err.kind(), ErrorKind::TimedOut),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(port.timeouts, vec![bound]);
        assert!(port.written.is_empty());
    }

    #[test]
    fn unopened_transport_rejects_io() {
        let mut transport = SerialTransport::new(SerialConfig::new("/dev/does-not-exist"));
        assert!(!transport.is_open());
        assert!(matches!(
            transport.read_byte(ReadMode::NonBlocking),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(
            transport.write(b"x", None),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(
            transport.bytes_available(),
            Err(TransportError::NotOpen)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn open_missing_device_reports_port_name() {
        let mut transport =
            SerialTransport::new(SerialConfig::new("/dev/simpleserial-missing-device"));
        match transport.open() {
            Err(TransportError::Open { port, .. }) => {
                assert_eq!(port, "/dev/simpleserial-missing-device")
            }
            other => panic!("expected open failure, got {other:?}"),
        }
        assert!(!transport.is_open());
    }

    #[test]
    fn close_is_idempotent() {
        let mut transport = SerialTransport::new(SerialConfig::new("/dev/ttyS99"));
        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }

    #[test]
    fn clone_of_unopened_transport_is_unopened() {
        let transport = SerialTransport::new(SerialConfig::new("/dev/ttyS99"));
        let clone = transport.try_clone().unwrap();
        assert!(!clone.is_open());
        assert_eq!(clone.name(), "/dev/ttyS99");
    }

    #[test]
    fn driver_mappings() {
        assert_eq!(driver_parity(Parity::Even), serialport::Parity::Even);
        assert_eq!(driver_parity(Parity::Odd), serialport::Parity::Odd);
        assert_eq!(driver_parity(Parity::None), serialport::Parity::None);
        assert_eq!(driver_stop_bits(StopBits::Two), serialport::StopBits::Two);
    }
}
