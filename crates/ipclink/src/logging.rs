use clap::ValueEnum;
use ipclink_channel::payload::{self, LogRecord};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives; overrides `--log-level`.
pub const LOG_ENV: &str = "IPCLINK_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
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

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.as_filter().into()))
}

/// Install the stderr subscriber. Channel threads (accept, send worker)
/// and forwarded worker records log through it too.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(level))
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

/// Re-emit a `Log` record received from a worker at its own severity.
pub fn forward_record(endpoint: &str, record: &LogRecord) {
    let function = record.function.as_str();
    let message = record.message.as_str();
    match record.level {
        payload::LogLevel::Fatal | payload::LogLevel::Error => {
            error!(endpoint, function, "{message}")
        }
        payload::LogLevel::Warn => warn!(endpoint, function, "{message}"),
        payload::LogLevel::Info => info!(endpoint, function, "{message}"),
        payload::LogLevel::Verbose | payload::LogLevel::Debug => {
            debug!(endpoint, function, "{message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_maps_to_filter() {
        assert_eq!(LogLevel::Warn.as_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::Trace.as_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn forwarding_accepts_every_severity() {
        for level in [
            payload::LogLevel::Fatal,
            payload::LogLevel::Error,
            payload::LogLevel::Warn,
            payload::LogLevel::Info,
            payload::LogLevel::Verbose,
            payload::LogLevel::Debug,
        ] {
            let record = LogRecord {
                level,
                function: "webview.new".to_string(),
                message: "page ready".to_string(),
            };
            forward_record("Web", &record);
        }
    }
}
