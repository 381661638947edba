use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use simpleserial_frame::FrameConfig;
use simpleserial_link::LinkConfig;
use simpleserial_transport::{BaudRate, Parity, SerialConfig, StopBits};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod ports;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports.
    Ports,
    /// Send a single frame.
    Send(SendArgs),
    /// Print received messages.
    Listen(ListenArgs),
    /// Reply to every received message with the same frame.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ports => ports::run(format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Echo(args) => echo::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Port and line settings shared by every command that opens a port.
#[derive(Args, Debug)]
pub struct PortArgs {
    /// Serial device (e.g. /dev/ttyUSB0, COM3).
    pub port: String,
    /// Line speed.
    #[arg(long, short = 'b', default_value = "9600", env = "SIMPLESERIAL_BAUD")]
    pub baud: BaudRate,
    /// Parity (none, odd, even).
    #[arg(long, default_value = "none")]
    pub parity: Parity,
    /// Stop bits (1 or 2).
    #[arg(long, default_value = "1")]
    pub stop_bits: StopBits,
    /// Port read timeout applied at open (e.g. 500ms, 2s).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Abandon a frame that takes longer than this to arrive.
    #[arg(long)]
    pub frame_timeout: Option<String>,
}

impl PortArgs {
    pub fn serial_config(&self) -> CliResult<SerialConfig> {
        let timeout = self.timeout.as_deref().map(parse_duration).transpose()?;
        Ok(SerialConfig::new(self.port.clone())
            .with_baud_rate(self.baud)
            .with_parity(self.parity)
            .with_stop_bits(self.stop_bits)
            .with_timeout(timeout))
    }

    pub fn link_config(&self) -> CliResult<LinkConfig> {
        let frame_timeout = self
            .frame_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()?;
        Ok(LinkConfig {
            frame: FrameConfig { frame_timeout },
            ..LinkConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Message title (0-255, decimal or 0x-prefixed hex).
    #[arg(long, short = 't', value_parser = parse_title)]
    pub title: u8,
    /// String payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (e.g. 01ff7e).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Only print messages with this title.
    #[arg(long, short = 't', value_parser = parse_title)]
    pub title: Option<u8>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Poll from this thread instead of running a receive thread.
    #[arg(long)]
    pub poll: bool,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub port: PortArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_title(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("title must be 0-255, got '{input}'"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

/// Flip `running` to false on Ctrl-C.
pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
