use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Targets that follow `--log-level`. Everything else stays at warn or
/// quieter, so a chatty dependency cannot flood the terminal while a
/// port is being traced byte by byte.
const LINK_TARGETS: [&str; 4] = [
    "simpleserial",
    "simpleserial_frame",
    "simpleserial_link",
    "simpleserial_transport",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    /// One flattened JSON object per event.
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_targets(LINK_TARGETS.map(|target| (target, level)))
}

/// Install the stderr subscriber; stdout carries received messages.
///
/// Returns false if a global subscriber was already set.
pub fn init_logging(format: LogFormat, level: LogLevel) -> bool {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer.with_filter(targets(level)))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                layer
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_filter(targets(level)),
            )
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn link_crates_follow_requested_level() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("simpleserial_link::link", &Level::TRACE));
        assert!(filter.would_enable("simpleserial_transport::serial", &Level::DEBUG));
        assert!(!filter.would_enable("mio::poll", &Level::INFO));
        assert!(filter.would_enable("mio::poll", &Level::WARN));
    }

    #[test]
    fn quiet_level_also_quiets_other_crates() {
        let filter = targets(LogLevel::Error);
        assert!(!filter.would_enable("simpleserial_frame::decoder", &Level::WARN));
        assert!(!filter.would_enable("mio::poll", &Level::WARN));
        assert!(filter.would_enable("mio::poll", &Level::ERROR));
    }

    #[test]
    fn second_install_is_refused() {
        init_logging(LogFormat::Json, LogLevel::Info);
        assert!(!init_logging(LogFormat::Text, LogLevel::Debug));
    }
}
