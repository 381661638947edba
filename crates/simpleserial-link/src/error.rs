use std::fmt;
use std::time::Duration;

use simpleserial_frame::FrameError;
use simpleserial_transport::TransportError;

/// Structured cause handed to a link's error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkFailure {
    /// The transport could not be opened or the receive loop could not start.
    ConnectionFailed,
    /// The receive loop hit a transport error and stopped.
    ReceiveThreadTerminated,
    /// A frame could not be written.
    SendFailed,
    /// A consumer asked for a message that can never arrive.
    QueueRetrievalFailed,
}

impl LinkFailure {
    /// Stable reason string for logs and machine-readable output.
    pub fn as_str(self) -> &'static str {
        match self {
            LinkFailure::ConnectionFailed => "connection_failed",
            LinkFailure::ReceiveThreadTerminated => "receive_thread_terminated",
            LinkFailure::SendFailed => "send_message_failed",
            LinkFailure::QueueRetrievalFailed => "get_message_failed",
        }
    }
}

impl fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Opening the transport failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] TransportError),

    /// The receive loop could not be started.
    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The receive loop stopped because of a transport failure or a panic.
    #[error("receive loop terminated: {reason}")]
    ReceiveLoopTerminated { reason: String },

    /// Writing a frame failed. The transport has been closed.
    #[error("send failed: {0}")]
    SendFailed(#[source] FrameError),

    /// The payload does not fit in one frame. Nothing was written.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The queue is empty and no receive loop is running to fill it.
    #[error("message queue retrieval failed: receive loop is not running")]
    QueueRetrievalFailed,

    /// No message arrived in time.
    #[error("no message within {0:?}")]
    Timeout(Duration),

    /// The link was used after its transport was closed.
    #[error("link is not connected")]
    NotConnected,

    /// `start()` was called while the receive loop was already running.
    #[error("receive loop already running")]
    AlreadyRunning,
}

impl LinkError {
    /// The handler-facing cause for this error, if it is a fatal one.
    pub fn failure(&self) -> Option<LinkFailure> {
        match self {
            LinkError::ConnectionFailed(_) | LinkError::Spawn(_) => {
                Some(LinkFailure::ConnectionFailed)
            }
            LinkError::ReceiveLoopTerminated { .. } => Some(LinkFailure::ReceiveThreadTerminated),
            LinkError::SendFailed(_) => Some(LinkFailure::SendFailed),
            LinkError::QueueRetrievalFailed => Some(LinkFailure::QueueRetrievalFailed),
            LinkError::PayloadTooLarge { .. }
            | LinkError::Timeout(_)
            | LinkError::NotConnected
            | LinkError::AlreadyRunning => None,
        }
    }
}

impl From<FrameError> for LinkError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => LinkError::PayloadTooLarge { size, max },
            other => LinkError::SendFailed(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
