use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{ByteTransport, ReadMode};

/// One direction of an in-memory link.
#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

#[derive(Debug, Default)]
struct PipeState {
    bytes: VecDeque<u8>,
    hung_up: bool,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.hung_up {
            return Err(TransportError::Closed);
        }
        state.bytes.extend(data.iter().copied());
        self.readable.notify_all();
        Ok(())
    }

    fn pop(&self, mode: ReadMode) -> Result<Option<u8>> {
        let mut state = self.lock();
        let deadline = match mode {
            ReadMode::Blocking(Some(timeout)) => Some(Instant::now() + timeout),
            _ => None,
        };

        loop {
            if let Some(byte) = state.bytes.pop_front() {
                return Ok(Some(byte));
            }
            if state.hung_up {
                return Err(TransportError::Closed);
            }
            match mode {
                ReadMode::NonBlocking => return Ok(None),
                ReadMode::Blocking(None) => {
                    state = self
                        .readable
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                ReadMode::Blocking(Some(_)) => {
                    let now = Instant::now();
                    let Some(remaining) = deadline.and_then(|d| d.checked_duration_since(now))
                    else {
                        return Ok(None);
                    };
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    let (guard, _timeout) = self
                        .readable
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    state = guard;
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    fn hang_up(&self) {
        let mut state = self.lock();
        state.hung_up = true;
        self.readable.notify_all();
    }
}

/// Failure switches shared by every clone of one endpoint.
#[derive(Debug, Default)]
struct Faults {
    refuse_open: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// In-process byte transport. [`MemoryTransport::pair`] returns two
/// connected endpoints; bytes written to one are read from the other.
///
/// Useful for exercising the framing layer without hardware, including
/// failure paths via the `inject_*` switches.
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
    faults: Arc<Faults>,
    open: bool,
}

impl MemoryTransport {
    /// Create two connected, unopened endpoints named `a` and `b`.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        let a = Self {
            name: "memory:a".to_string(),
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
            faults: Arc::new(Faults::default()),
            open: false,
        };
        let b = Self {
            name: "memory:b".to_string(),
            rx: a_to_b,
            tx: b_to_a,
            faults: Arc::new(Faults::default()),
            open: false,
        };
        (a, b)
    }

    /// Make the next `open()` calls fail, as if the device were missing.
    pub fn refuse_open(&self) {
        self.faults.refuse_open.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent read on this endpoint (and its clones) fail.
    pub fn inject_read_failure(&self) {
        self.faults.fail_reads.store(true, Ordering::SeqCst);
        self.rx.readable.notify_all();
    }

    /// Make every subsequent write on this endpoint (and its clones) fail.
    pub fn inject_write_failure(&self) {
        self.faults.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Disconnect both directions. Pending bytes can still be drained; after
    /// that reads and writes report [`TransportError::Closed`].
    pub fn hang_up(&self) {
        debug!(name = %self.name, "memory transport hung up");
        self.rx.hang_up();
        self.tx.hang_up();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }
}

impl ByteTransport for MemoryTransport {
    fn open(&mut self) -> Result<()> {
        if self.faults.refuse_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open {
                port: self.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "device refused open"),
            });
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_byte(&mut self, mode: ReadMode) -> Result<Option<u8>> {
        self.ensure_open()?;
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::other("injected read failure")));
        }
        self.rx.pop(mode)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::other("injected read failure")));
        }
        Ok(self.rx.len())
    }

    fn write(&mut self, bytes: &[u8], _timeout: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::other("injected write failure")));
        }
        self.tx.push(bytes)
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            name: self.name.clone(),
            rx: Arc::clone(&self.rx),
            tx: Arc::clone(&self.tx),
            faults: Arc::clone(&self.faults),
            open: self.open,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
