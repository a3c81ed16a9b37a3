//! Structured logging layer using the tracing crate.

use crate::telemetry::config::{LogFormat, LogLevel, LoggingConfig};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Builder for the global logging subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggingBuilder {
    config: LoggingConfig,
}

impl LoggingBuilder {
    /// Create a new logging builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from an existing configuration.
    pub fn from_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.config.ansi_colors = enabled;
        self
    }

    /// Include span open/close events.
    pub fn with_spans(mut self, enabled: bool) -> Self {
        self.config.with_spans = enabled;
        self
    }

    /// Include target in logs.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.config.with_target = enabled;
        self
    }

    /// Set filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Build and install the global subscriber.
    pub fn init(self) -> crate::error::Result<()> {
        let env_filter = self.build_filter();
        let span_events = if self.config.with_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let registry = tracing_subscriber::registry().with(env_filter);

        let result = match self.config.format {
            LogFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(self.config.ansi_colors)
                        .with_target(self.config.with_target)
                        .with_file(self.config.with_file)
                        .with_line_number(self.config.with_file)
                        .with_span_events(span_events),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_ansi(self.config.ansi_colors)
                        .with_target(self.config.with_target)
                        .with_file(self.config.with_file)
                        .with_line_number(self.config.with_file)
                        .with_span_events(span_events),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(self.config.with_spans)
                        .with_span_list(self.config.with_spans)
                        .with_file(self.config.with_file)
                        .with_line_number(self.config.with_file)
                        .with_span_events(span_events),
                )
                .try_init(),
            LogFormat::Full => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(self.config.ansi_colors)
                        .with_target(self.config.with_target)
                        .with_file(self.config.with_file)
                        .with_line_number(self.config.with_file)
                        .with_span_events(FmtSpan::FULL),
                )
                .try_init(),
        };

        result.map_err(|e| crate::error::Error::Config(e.to_string()))
    }

    fn build_filter(&self) -> EnvFilter {
        let default_filter = self.config.level.to_string();

        if let Some(ref filter) = self.config.filter {
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new(&default_filter))
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter))
        }
    }
}

/// Install logging for a `-v` count, with the given format.
pub fn init_logging(verbosity: u8, format: LogFormat) -> crate::error::Result<()> {
    LoggingBuilder::new()
        .with_level(LogLevel::from_verbosity(verbosity))
        .with_format(format)
        .init()
}
