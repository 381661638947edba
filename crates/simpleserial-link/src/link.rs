use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use simpleserial_frame::{
    DecoderStats, FrameDecoder, FrameError, FrameWriter, Message, ResetHandle,
};
use simpleserial_transport::{ByteTransport, ReadMode, TransportError};
use tracing::{debug, error, info};

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkFailure, Result};
use crate::handler::{FailureSink, MessageHandler};

/// A framed connection with a background receive thread.
///
/// The receive thread owns its own transport handle, reads one byte at a
/// time, and pushes every decoded [`Message`] into an unbounded queue (and
/// to the message handler, if one is registered). The link itself keeps the
/// write handle for [`send`](Self::send); the receive thread closes that
/// handle too if it dies on a transport error, so the port is released and
/// [`is_connected`](Self::is_connected) turns false before the error
/// handler runs.
///
/// ```no_run
/// use simpleserial_link::{LinkConfig, SerialLink};
/// use simpleserial_transport::{SerialConfig, SerialTransport};
///
/// let transport = SerialTransport::new(SerialConfig::new("/dev/ttyUSB0"));
/// let mut link = SerialLink::new(transport, LinkConfig::default())
///     .with_error_handler(|failure| eprintln!("link failed: {failure}"));
/// link.connect()?;
/// link.start()?;
/// link.send(0x01, b"hello")?;
/// let reply = link.take_message()?;
/// println!("title={} payload={:?}", reply.title(), reply.payload());
/// link.stop()?;
/// # Ok::<(), simpleserial_link::LinkError>(())
/// ```
pub struct SerialLink<T: ByteTransport + 'static> {
    writer: SharedWriter<T>,
    name: String,
    config: LinkConfig,
    queue_tx: Sender<Message>,
    queue_rx: Receiver<Message>,
    decoder: Option<FrameDecoder>,
    reset: ResetHandle,
    on_message: Option<MessageHandler>,
    failures: FailureSink,
    receiver: Option<ReceiveThread>,
    receive_failed: Arc<AtomicBool>,
    last_stats: DecoderStats,
}

struct ReceiveThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<ReceiveExit>,
}

struct ReceiveExit {
    decoder: FrameDecoder,
    on_message: Option<MessageHandler>,
    error: Option<TransportError>,
}

type SharedWriter<T> = Arc<Mutex<FrameWriter<T>>>;

struct ReceiveContext<T> {
    writer: SharedWriter<T>,
    stop: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    queue: Sender<Message>,
    failures: FailureSink,
    poll_interval: Duration,
}

impl<T: ByteTransport + 'static> SerialLink<T> {
    /// Wrap an unopened transport. Call [`connect`](Self::connect) and
    /// [`start`](Self::start) before use.
    pub fn new(transport: T, config: LinkConfig) -> Self {
        let decoder = FrameDecoder::with_config(config.frame.clone());
        let reset = decoder.reset_handle();
        let (queue_tx, queue_rx) = channel::unbounded();
        Self {
            name: transport.name().to_string(),
            writer: Arc::new(Mutex::new(FrameWriter::with_timeout(
                transport,
                config.write_timeout,
            ))),
            config,
            queue_tx,
            queue_rx,
            decoder: Some(decoder),
            reset,
            on_message: None,
            failures: FailureSink::default(),
            receiver: None,
            receive_failed: Arc::new(AtomicBool::new(false)),
            last_stats: DecoderStats::default(),
        }
    }

    /// Also deliver each message to `handler`, on the receive thread, right
    /// after it is queued.
    pub fn with_message_handler(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    /// Register the handler told about fatal failures.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(LinkFailure) + Send + Sync + 'static,
    ) -> Self {
        self.failures.set(Arc::new(handler));
        self
    }

    /// Open the transport.
    ///
    /// On failure the error handler is told `ConnectionFailed` and the error
    /// is returned as well.
    pub fn connect(&mut self) -> Result<()> {
        let opened = self.writer().get_mut().open();
        if let Err(err) = opened {
            error!(port = %self.name, %err, "connect failed");
            self.failures.notify(LinkFailure::ConnectionFailed);
            return Err(LinkError::ConnectionFailed(err));
        }
        self.receive_failed.store(false, Ordering::Release);
        info!(port = %self.name, "link connected");
        Ok(())
    }

    /// Whether the write side of the transport is open.
    ///
    /// False from the moment the receive thread gives up on a transport
    /// error, without waiting for the next [`send`](Self::send).
    pub fn is_connected(&self) -> bool {
        self.writer().get_ref().is_open()
    }

    /// Spawn the receive thread.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(LinkError::AlreadyRunning);
        }
        self.reap();
        if !self.is_connected() || self.receive_failed.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }

        let cloned = self.writer().get_ref().try_clone();
        let transport = match cloned {
            Ok(transport) => transport,
            Err(err) => {
                self.failures.notify(LinkFailure::ConnectionFailed);
                return Err(LinkError::ConnectionFailed(err));
            }
        };

        let decoder = self.take_decoder();
        let on_message = self.on_message.take();
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = ReceiveContext {
            writer: Arc::clone(&self.writer),
            stop: Arc::clone(&stop),
            failed: Arc::clone(&self.receive_failed),
            queue: self.queue_tx.clone(),
            failures: self.failures.clone(),
            poll_interval: self.config.poll_interval,
        };

        let spawned = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || receive_loop(transport, decoder, on_message, ctx));

        match spawned {
            Ok(handle) => {
                self.receiver = Some(ReceiveThread { stop, handle });
                Ok(())
            }
            Err(err) => {
                self.failures.notify(LinkFailure::ConnectionFailed);
                Err(LinkError::Spawn(err))
            }
        }
    }

    /// Stop the receive thread and wait for it to exit.
    ///
    /// Returns the decoder counters. If the thread had already died on a
    /// transport error, that failure is returned instead (the error handler
    /// was told when it happened).
    pub fn stop(&mut self) -> Result<DecoderStats> {
        let Some(thread) = self.receiver.take() else {
            return Ok(self.last_stats);
        };
        thread.stop.store(true, Ordering::Release);
        self.join(thread)
    }

    /// Whether the receive thread is alive.
    pub fn is_running(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|thread| !thread.handle.is_finished())
    }

    /// Stop receiving and close the transport.
    pub fn close(&mut self) {
        if let Err(err) = self.stop() {
            debug!(%err, "receive loop had already failed before close");
        }
        self.writer().get_mut().close();
    }

    /// Encode and write one frame.
    ///
    /// A payload longer than 255 bytes is rejected without touching the
    /// wire. A write failure closes the link and reports `SendFailed`.
    pub fn send(&mut self, title: u8, payload: &[u8]) -> Result<()> {
        if self.receive_failed.load(Ordering::Acquire) || !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let sent = self.writer().send(title, payload);
        match sent {
            Ok(()) => Ok(()),
            Err(FrameError::PayloadTooLarge { size, max }) => {
                Err(LinkError::PayloadTooLarge { size, max })
            }
            Err(err) => {
                error!(%err, title, "send failed; closing link");
                self.close();
                self.failures.notify(LinkFailure::SendFailed);
                Err(LinkError::SendFailed(err))
            }
        }
    }

    /// Send an already built message.
    pub fn send_message(&mut self, message: &Message) -> Result<()> {
        self.send(message.title(), message.payload())
    }

    /// Number of messages waiting in the queue.
    pub fn message_count(&self) -> usize {
        self.queue_rx.len()
    }

    /// Take the oldest queued message without waiting.
    pub fn try_take_message(&self) -> Option<Message> {
        self.queue_rx.try_recv().ok()
    }

    /// Take the oldest queued message, blocking until one arrives.
    ///
    /// Fails with `QueueRetrievalFailed` once the queue is empty and the
    /// receive thread is no longer running, since nothing could fill it.
    pub fn take_message(&self) -> Result<Message> {
        loop {
            if let Some(message) = self.try_take_message() {
                return Ok(message);
            }
            if !self.is_running() {
                return Err(self.retrieval_failed());
            }
            match self.queue_rx.recv_timeout(self.config.poll_interval) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(self.retrieval_failed()),
            }
        }
    }

    /// Like [`take_message`](Self::take_message), giving up after `timeout`.
    pub fn take_message_timeout(&self, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_take_message() {
                return Ok(message);
            }
            if !self.is_running() {
                return Err(self.retrieval_failed());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LinkError::Timeout(timeout));
            }
            let wait = (deadline - now).min(self.config.poll_interval);
            match self.queue_rx.recv_timeout(wait) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(self.retrieval_failed()),
            }
        }
    }

    /// Take every message currently queued.
    pub fn drain_messages(&self) -> Vec<Message> {
        self.queue_rx.try_iter().collect()
    }

    /// Handle for dropping the decoder's partial frame from any thread.
    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }

    /// Drop any partially received frame before the next byte is decoded.
    pub fn reset_decoder(&self) {
        self.reset.reset();
    }

    /// Decoder counters as of the last time the receive thread stopped.
    pub fn decoder_stats(&self) -> DecoderStats {
        match &self.decoder {
            Some(decoder) => decoder.stats(),
            None => self.last_stats,
        }
    }

    /// Current link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Name of the underlying transport.
    pub fn transport_name(&self) -> &str {
        &self.name
    }

    fn writer(&self) -> MutexGuard<'_, FrameWriter<T>> {
        lock_writer(&self.writer)
    }

    fn take_decoder(&mut self) -> FrameDecoder {
        match self.decoder.take() {
            Some(decoder) => decoder,
            None => {
                let decoder = FrameDecoder::with_config(self.config.frame.clone());
                self.reset = decoder.reset_handle();
                decoder
            }
        }
    }

    /// Join a receive thread that already exited on its own.
    fn reap(&mut self) {
        if let Some(thread) = self.receiver.take() {
            let _ = self.join(thread);
        }
    }

    fn join(&mut self, thread: ReceiveThread) -> Result<DecoderStats> {
        match thread.handle.join() {
            Ok(exit) => {
                self.last_stats = exit.decoder.stats();
                self.decoder = Some(exit.decoder);
                self.on_message = exit.on_message;
                debug!(stats = ?self.last_stats, "receive thread joined");
                match exit.error {
                    None => Ok(self.last_stats),
                    Some(err) => Err(LinkError::ReceiveLoopTerminated {
                        reason: err.to_string(),
                    }),
                }
            }
            Err(_) => {
                error!("receive thread panicked");
                self.writer().get_mut().close();
                self.receive_failed.store(true, Ordering::Release);
                self.failures.notify(LinkFailure::ReceiveThreadTerminated);
                Err(LinkError::ReceiveLoopTerminated {
                    reason: "receive thread panicked".to_string(),
                })
            }
        }
    }

    fn retrieval_failed(&self) -> LinkError {
        self.failures.notify(LinkFailure::QueueRetrievalFailed);
        LinkError::QueueRetrievalFailed
    }
}

impl<T: ByteTransport + 'static> Drop for SerialLink<T> {
    fn drop(&mut self) {
        if let Some(thread) = self.receiver.take() {
            thread.stop.store(true, Ordering::Release);
            let _ = thread.handle.join();
        }
        self.writer().get_mut().close();
    }
}

impl<T: ByteTransport + 'static> std::fmt::Debug for SerialLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("transport", &self.transport_name())
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .field("queued", &self.message_count())
            .finish()
    }
}

fn receive_loop<T: ByteTransport>(
    mut transport: T,
    mut decoder: FrameDecoder,
    mut on_message: Option<MessageHandler>,
    ctx: ReceiveContext<T>,
) -> ReceiveExit {
    info!(port = %transport.name(), "receive loop started");

    let error = loop {
        if ctx.stop.load(Ordering::Acquire) {
            break None;
        }

        let byte = match transport.read_byte(ReadMode::Blocking(Some(ctx.poll_interval))) {
            Ok(Some(byte)) => byte,
            Ok(None) => continue,
            Err(err) => break Some(err),
        };

        let Some(message) = decoder.feed(byte) else {
            continue;
        };

        let queued = match on_message.as_mut() {
            Some(handler) => {
                let queued = ctx.queue.send(message.clone()).is_ok();
                handler(message);
                queued
            }
            None => ctx.queue.send(message).is_ok(),
        };
        if !queued {
            break None;
        }
    };

    transport.close();
    match &error {
        Some(err) => {
            error!(port = %transport.name(), %err, "receive loop terminated");
            lock_writer(&ctx.writer).get_mut().close();
            ctx.failed.store(true, Ordering::Release);
            ctx.failures.notify(LinkFailure::ReceiveThreadTerminated);
        }
        None => info!(port = %transport.name(), "receive loop stopped"),
    }

    ReceiveExit {
        decoder,
        on_message,
        error,
    }
}

fn lock_writer<T>(writer: &Mutex<FrameWriter<T>>) -> MutexGuard<'_, FrameWriter<T>> {
    writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
