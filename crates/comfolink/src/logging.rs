use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
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

    /// Module targets only help once session internals are being traced.
    fn show_target(self) -> bool {
        self.as_filter() >= LevelFilter::DEBUG
    }
}

/// Install the stderr subscriber. Stdout is reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(level.show_target());

    match format {
        LogFormat::Text => {
            let _ = builder.compact().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().with_current_span(false).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_appear_from_debug_up() {
        assert!(!LogLevel::Info.show_target());
        assert!(LogLevel::Debug.show_target());
        assert!(LogLevel::Trace.show_target());
    }

    #[test]
    fn filters_follow_severity() {
        assert!(LogLevel::Error.as_filter() < LogLevel::Warn.as_filter());
        assert_eq!(LogLevel::Info.as_filter(), LevelFilter::INFO);
    }
}
