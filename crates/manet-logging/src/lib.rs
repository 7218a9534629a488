//! Tracing subscriber setup for the MANET routing stack
//!
//! Every node engine logs through `tracing` with structured fields. This
//! crate installs the global subscriber that collects those events, either
//! as human-readable console output while developing or as JSON lines for
//! post-processing simulation runs.
//!
//! # Quick Start
//!
//! ```ignore
//! use manet_logging::{LogConfig, SubscriberBuilder};
//!
//! // JSON lines to stderr, level from RUST_LOG or "info"
//! let _guard = SubscriberBuilder::new().init();
//!
//! // Pretty output while developing
//! let _guard = SubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! The returned guard flushes the file writer on drop and must be kept
//! alive for as long as logging is wanted.

pub mod config;
pub mod error;

pub use config::{ConsoleConfig, FileConfig, JsonConfig, LogConfig, RotationStrategy};
pub use error::{LoggingError, LoggingResult};

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and initializing the logging subscriber
///
/// By default console output uses JSON lines. Use [`LogConfig::development`]
/// for human-readable output.
#[derive(Debug, Clone, Default)]
pub struct SubscriberBuilder {
    config: LogConfig,
}

impl SubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Switch console output between pretty text and JSON lines
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config.targets.insert(target.into(), level.into());
        self
    }

    /// The configuration the subscriber will be built from
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the filter: `RUST_LOG` when set, else the configured directives
    pub fn env_filter(&self) -> LoggingResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.config.directives())
                .map_err(|e| LoggingError::Filter(e.to_string())),
        }
    }

    /// Initialize the subscriber globally
    ///
    /// Failures are reported on stderr and leave logging disabled. Returns a
    /// guard that must be kept alive while file output is in use.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Initialize the subscriber globally, reporting failures
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let env_filter = self.env_filter()?;
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = create_file_writer(file_config)?;
            guard = Some(file_guard);
            layers.push(self.json_layer(writer));
        }

        Registry::default()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            tracing_subscriber::fmt::layer()
                .with_ansi(self.config.console.ansi)
                .with_target(true)
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            self.json_layer(std::io::stderr)
        }
    }

    fn json_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let json = &self.config.json;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(json.include_spans)
            .flatten_event(json.flatten_events)
            .with_file(json.include_location)
            .with_line_number(json.include_location)
            .with_writer(writer)
            .boxed()
    }
}

/// Open the log file. `Never` truncates a single file, the others append
/// to a rolling set.
fn create_file_writer(file_config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&file_config.directory)?;
            let file_path = file_config
                .directory
                .join(format!("{}.log", file_config.prefix));
            let file = File::create(file_path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let appender = RollingFileAppender::new(rotation, &file_config.directory, &file_config.prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize with default configuration (JSON lines to the console)
pub fn init_default() -> Option<WorkerGuard> {
    SubscriberBuilder::new().init()
}

/// Initialize for development (pretty output, debug level)
pub fn init_development() -> Option<WorkerGuard> {
    SubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize for tests (warnings only); safe to call from every test
pub fn init_testing() {
    let _ = SubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
