use simpleserial_frame::{
    DecoderStats, FrameConfig, FrameDecoder, FrameError, FrameWriter, Message, ResetHandle,
};
use simpleserial_transport::{ByteTransport, ReadMode};
use tracing::{error, info, trace};

use crate::error::{LinkError, LinkFailure, Result};
use crate::handler::{FailureSink, MessageHandler};

/// Callback-mode dispatch: no thread, the caller drives reads with
/// [`poll`](Self::poll).
///
/// Each `poll` consumes at most the bytes that were already buffered when it
/// was called, so it never blocks and a chatty device cannot keep it spinning.
pub struct Poller<T: ByteTransport> {
    io: FrameWriter<T>,
    decoder: FrameDecoder,
    on_message: Option<MessageHandler>,
    failures: FailureSink,
}

impl<T: ByteTransport> Poller<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, FrameConfig::default())
    }

    pub fn with_config(transport: T, config: FrameConfig) -> Self {
        Self {
            io: FrameWriter::new(transport),
            decoder: FrameDecoder::with_config(config),
            on_message: None,
            failures: FailureSink::default(),
        }
    }

    /// Route every decoded message to `handler` instead of returning it.
    pub fn with_message_handler(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    /// Register the handler told about fatal failures.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(LinkFailure) + Send + Sync + 'static,
    ) -> Self {
        self.failures.set(std::sync::Arc::new(handler));
        self
    }

    /// Open the transport, reporting `ConnectionFailed` on error.
    pub fn connect(&mut self) -> Result<()> {
        if let Err(err) = self.io.get_mut().open() {
            error!(port = %self.io.get_ref().name(), %err, "connect failed");
            self.failures.notify(LinkFailure::ConnectionFailed);
            return Err(LinkError::ConnectionFailed(err));
        }
        info!(port = %self.io.get_ref().name(), "poller connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.io.get_ref().is_open()
    }

    /// Decode whatever is already buffered on the transport.
    ///
    /// With a message handler registered, every completed message goes to the
    /// handler and this returns `Ok(None)`. Without one, it stops at the first
    /// completed message and returns it; remaining bytes wait for the next
    /// call.
    ///
    /// A read failure closes the transport, reports `ReceiveThreadTerminated`
    /// and returns [`LinkError::ReceiveLoopTerminated`].
    pub fn poll(&mut self) -> Result<Option<Message>> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let available = match self.io.get_mut().bytes_available() {
            Ok(n) => n,
            Err(err) => return Err(self.read_failed(err.to_string())),
        };
        trace!(available, "poll");

        for _ in 0..available {
            let byte = match self.io.get_mut().read_byte(ReadMode::NonBlocking) {
                Ok(Some(byte)) => byte,
                Ok(None) => break,
                Err(err) => return Err(self.read_failed(err.to_string())),
            };
            let Some(message) = self.decoder.feed(byte) else {
                continue;
            };
            match self.on_message.as_mut() {
                Some(handler) => handler(message),
                None => return Ok(Some(message)),
            }
        }
        Ok(None)
    }

    /// Encode and write one frame. Same failure rules as
    /// [`SerialLink::send`](crate::SerialLink::send).
    pub fn send(&mut self, title: u8, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        match self.io.send(title, payload) {
            Ok(()) => Ok(()),
            Err(FrameError::PayloadTooLarge { size, max }) => {
                Err(LinkError::PayloadTooLarge { size, max })
            }
            Err(err) => {
                error!(%err, title, "send failed; closing transport");
                self.io.get_mut().close();
                self.failures.notify(LinkFailure::SendFailed);
                Err(LinkError::SendFailed(err))
            }
        }
    }

    pub fn reset_handle(&self) -> ResetHandle {
        self.decoder.reset_handle()
    }

    /// Drop any partially received frame.
    pub fn reset_decoder(&mut self) {
        self.decoder.reset();
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn close(&mut self) {
        self.io.get_mut().close();
    }

    pub fn get_ref(&self) -> &T {
        self.io.get_ref()
    }

    pub fn into_inner(self) -> T {
        self.io.into_inner()
    }

    fn read_failed(&mut self, reason: String) -> LinkError {
        error!(port = %self.io.get_ref().name(), %reason, "poll read failed");
        self.io.get_mut().close();
        self.failures.notify(LinkFailure::ReceiveThreadTerminated);
        LinkError::ReceiveLoopTerminated { reason }
    }
}

impl<T: ByteTransport> std::fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("transport", &self.io.get_ref().name())
            .field("state", &self.decoder.state())
            .field("handler", &self.on_message.is_some())
            .finish()
    }
}
