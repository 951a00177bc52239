//! Logging setup for the `cuttle` binary
//!
//! Console output goes to stderr so query results on stdout stay
//! machine-readable. `RUST_LOG` takes precedence over the default filter.

use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span open/close (connect, execute and query spans)
    pub enable_spans: bool,

    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "warn,cuttle=info,cuttle_pool=info,cuttle_scope=info,cuttle_driver_sqlite=info"
                .to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration that traces pool bookkeeping
    pub fn verbose() -> Self {
        Self {
            include_location: true,
            enable_spans: true,
            default_filter: "info,cuttle=debug,cuttle_pool=debug,cuttle_scope=debug,cuttle_driver_sqlite=debug"
                .to_string(),
            ..Self::default()
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Initialize the logging system with the given configuration
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW fires once when the span is created; ENTER would fire on every
    // re-poll of the instrumented future.
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = if config.json {
        fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).try_init()?;

    tracing::debug!(json = config.json, filter = %config.default_filter, "logging initialized");
    Ok(())
}
