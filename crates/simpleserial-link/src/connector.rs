use simpleserial_transport::{ByteTransport, SerialConfig, SerialTransport};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::link::SerialLink;

/// Open `transport` and start its receive thread with default settings.
pub fn connect<T: ByteTransport + 'static>(transport: T) -> Result<SerialLink<T>> {
    connect_with_config(transport, LinkConfig::default())
}

/// Open `transport` and start its receive thread.
///
/// Register handlers with [`SerialLink::new`] and the `with_*` builders
/// instead if you need to hear about connection failures.
pub fn connect_with_config<T: ByteTransport + 'static>(
    transport: T,
    config: LinkConfig,
) -> Result<SerialLink<T>> {
    let mut link = SerialLink::new(transport, config);
    link.connect()?;
    link.start()?;
    Ok(link)
}

/// Open a serial port and start receiving on it.
pub fn open_serial(serial: SerialConfig, config: LinkConfig) -> Result<SerialLink<SerialTransport>> {
    connect_with_config(SerialTransport::new(serial), config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use simpleserial_frame::encode;
    use simpleserial_transport::MemoryTransport;

    use super::*;
    use crate::error::LinkError;

    #[test]
    fn connect_convenience() {
        let (local, mut remote) = MemoryTransport::pair();
        remote.open().unwrap();

        let link = connect(local).expect("memory link should connect");
        assert!(link.is_running());

        remote.write(&encode(1, b"hi").unwrap(), None).unwrap();
        let message = link
            .take_message_timeout(Duration::from_secs(2))
            .expect("message should arrive");
        assert_eq!(message.payload().as_ref(), b"hi");
    }

    #[test]
    fn connect_refused() {
        let (local, _remote) = MemoryTransport::pair();
        local.refuse_open();
        assert!(matches!(
            connect(local),
            Err(LinkError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn open_serial_missing_port() {
        let serial = SerialConfig::new("/dev/simpleserial-does-not-exist");
        let err = open_serial(serial, LinkConfig::default()).unwrap_err();
        assert!(matches!(err, LinkError::ConnectionFailed(_)));
    }
}
