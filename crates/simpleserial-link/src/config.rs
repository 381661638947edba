use std::time::Duration;

use simpleserial_frame::FrameConfig;

/// Runtime behavior of a link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Upper bound on a single blocking read in the receive thread. The stop
    /// flag is checked between reads, so this bounds how long `stop()` waits.
    pub poll_interval: Duration,
    /// Timeout for each frame write. `None` blocks until written.
    pub write_timeout: Option<Duration>,
    /// Decoder settings.
    pub frame: FrameConfig,
    /// Name given to the receive thread.
    pub thread_name: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            write_timeout: None,
            frame: FrameConfig::default(),
            thread_name: "simpleserial-rx".to_string(),
        }
    }
}
