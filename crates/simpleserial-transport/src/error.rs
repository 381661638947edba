/// Errors that can occur in byte transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the named port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// Failed to enumerate serial ports.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(std::io::Error),

    /// An I/O error occurred on the open transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was used before `open()` or after `close()`.
    #[error("transport is not open")]
    NotOpen,

    /// The remote end hung up.
    #[error("transport closed by remote end")]
    Closed,

    /// A configuration value could not be parsed or is unsupported.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
